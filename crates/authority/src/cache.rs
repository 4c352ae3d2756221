//! A pre-generated IBE system with private keys for a preset list of names.
//!
//! Test deployments need hundreds of identity keys up front. Generating them
//! once and storing the result as JSON keeps deployments fast and
//! reproducible:
//!
//! ```json
//! {
//!   "public_params": "<hex blob>",
//!   "public_param_shards": ["<hex blob>", ...],
//!   "ibe_secrets": ["<hex blob>", ...],
//!   "private_keys": { "client-00001": "<hex blob>", ... }
//! }
//! ```
//!
//! `ibe_secrets` holds one formatted secret share per shard, so the file must
//! stay with the operator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use tracing::info;
use zeroize::Zeroize;

use overlay_crypto::{
    format_private_key, format_public_share, format_system_params, format_system_secret,
    parse_private_key, parse_public_share, parse_system_params, parse_system_secret,
    PairingBackend, PrivateKey, PublicShare, Shard, SystemParameters, SystemSecret,
};
use overlay_types::{registrar_shard_identity, REGISTRAR_IDENTITY};

use crate::authority::ThresholdIbeAuthority;
use crate::error::CacheError;

/// Name template used when none is given.
pub const DEFAULT_NAME_TEMPLATE: &str = "client-%05d";

#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbeCache {
    #[serde_as(as = "Hex")]
    public_params: Vec<u8>,
    #[serde_as(as = "Vec<Hex>")]
    public_param_shards: Vec<Vec<u8>>,
    #[serde_as(as = "Vec<Hex>")]
    ibe_secrets: Vec<Vec<u8>>,
    #[serde_as(as = "BTreeMap<_, Hex>")]
    private_keys: BTreeMap<String, Vec<u8>>,
}

impl IbeCache {
    /// Generate a fresh system from `shard_count` shards and derive a key for every name.
    pub fn generate<B: PairingBackend, R: RngCore + CryptoRng>(
        names: &[String],
        shard_count: usize,
        rng: &mut R,
    ) -> Result<Self, CacheError> {
        let authority = ThresholdIbeAuthority::<B>::new();
        let shards: Vec<Shard<B>> = (0..shard_count)
            .map(|_| authority.generate_shard(&mut *rng))
            .collect();
        let (params, secret) = authority.generate_system(&shards)?;

        let private_keys = names
            .iter()
            .map(|name| {
                let key = authority.generate_private_key(&secret, name);
                (name.clone(), format_private_key(&key).to_vec())
            })
            .collect();

        info!(
            shards = shards.len(),
            names = names.len(),
            curve = B::CURVE,
            "Generated IBE cache"
        );

        Ok(Self {
            public_params: format_system_params(&params),
            public_param_shards: shards
                .iter()
                .map(|s| format_public_share(&s.public_share()))
                .collect(),
            ibe_secrets: shards
                .iter()
                .map(|s| {
                    let share = SystemSecret::<B>::from_scalar(*s.secret_share());
                    format_system_secret(&share).to_vec()
                })
                .collect(),
            private_keys,
        })
    }

    /// Expand name templates for `1..=count`, then append the registrar
    /// identity and its per-shard variants.
    pub fn preset_names(templates: &[String], count: u32, shards: u32) -> Vec<String> {
        let mut names: Vec<String> = if templates.is_empty() {
            (1..=count)
                .map(|i| expand_template(DEFAULT_NAME_TEMPLATE, i))
                .collect()
        } else {
            templates
                .iter()
                .flat_map(|t| (1..=count).map(move |i| expand_template(t, i)))
                .collect()
        };
        names.push(REGISTRAR_IDENTITY.to_string());
        names.extend((1..=shards).map(registrar_shard_identity));
        names
    }

    pub fn shard_count(&self) -> usize {
        self.ibe_secrets.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.private_keys.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.private_keys.contains_key(name)
    }

    pub fn public_params_bytes(&self) -> &[u8] {
        &self.public_params
    }

    pub fn system_parameters<B: PairingBackend>(&self) -> Result<SystemParameters<B>, CacheError> {
        Ok(parse_system_params(&self.public_params)?)
    }

    pub fn public_shares<B: PairingBackend>(&self) -> Result<Vec<PublicShare<B>>, CacheError> {
        self.public_param_shards
            .iter()
            .map(|bytes| parse_public_share(bytes).map_err(CacheError::from))
            .collect()
    }

    /// Rebuild the shards from their stored halves.
    pub fn shards<B: PairingBackend>(&self) -> Result<Vec<Shard<B>>, CacheError> {
        if self.ibe_secrets.len() != self.public_param_shards.len() {
            return Err(CacheError::Inconsistent("shard secret and public counts differ"));
        }

        self.ibe_secrets
            .iter()
            .zip(self.public_shares::<B>()?)
            .map(|(secret, public)| -> Result<Shard<B>, CacheError> {
                let secret = parse_system_secret::<B>(secret)?;
                Ok(Shard::from_parts(*secret.expose_scalar(), public.0))
            })
            .collect()
    }

    /// Re-aggregate the master secret and check it against the cached parameters.
    pub fn system_secret<B: PairingBackend>(&self) -> Result<SystemSecret<B>, CacheError> {
        let (params, secret) = ThresholdIbeAuthority::<B>::new().generate_system(&self.shards()?)?;
        if params != self.system_parameters()? {
            return Err(CacheError::Inconsistent(
                "shards do not aggregate to the cached parameters",
            ));
        }
        Ok(secret)
    }

    /// Look up the cached key for `name`.
    pub fn private_key<B: PairingBackend>(&self, name: &str) -> Result<PrivateKey<B>, CacheError> {
        let bytes = self
            .private_keys
            .get(name)
            .ok_or_else(|| CacheError::MissingName(name.to_string()))?;
        let key = parse_private_key::<B>(bytes)?;
        if key.identity() != name {
            return Err(CacheError::Inconsistent("private key stored under another name"));
        }
        Ok(key)
    }

    /// Derive a key for `name` from the cached shards and store it.
    pub fn derive<B: PairingBackend>(&mut self, name: &str) -> Result<PrivateKey<B>, CacheError> {
        let secret = self.system_secret::<B>()?;
        let key = ThresholdIbeAuthority::<B>::new().generate_private_key(&secret, name);
        self.insert_private_key(&key);
        Ok(key)
    }

    pub fn insert_private_key<B: PairingBackend>(&mut self, key: &PrivateKey<B>) {
        if let Some(mut old) = self
            .private_keys
            .insert(key.identity().to_string(), format_private_key(key).to_vec())
        {
            old.zeroize();
        }
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Debug for IbeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IbeCache")
            .field("shards", &self.ibe_secrets.len())
            .field("names", &self.private_keys.len())
            .finish_non_exhaustive()
    }
}

impl Drop for IbeCache {
    fn drop(&mut self) {
        self.ibe_secrets.zeroize();
        self.private_keys.values_mut().for_each(Zeroize::zeroize);
    }
}

/// Substitute `index` into a printf-style template.
///
/// Supports `%d`, `%Nd`, `%0Nd` and `%%`; any other `%` sequence is copied
/// through unchanged.
pub fn expand_template(template: &str, index: u32) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }

        if chars.peek() == Some(&'d') {
            chars.next();
            let zero_pad = digits.starts_with('0');
            let width: usize = digits.parse().unwrap_or(0);
            if zero_pad {
                out.push_str(&format!("{index:0width$}"));
            } else {
                out.push_str(&format!("{index:width$}"));
            }
        } else {
            out.push('%');
            out.push_str(&digits);
        }
    }

    out
}
