//! Bytecode-only contract classification.
//!
//! A function counts as present when its 4-byte selector appears anywhere in
//! the hex text of the deployed code. A standard counts as implemented when
//! all of its required functions are present. The result depends only on
//! the bytecode, so it is cached by content hash and never invalidated.

pub mod selectors;

use alloy_primitives::{B256, hex, keccak256};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

use selectors::{FUNCTIONS, STANDARDS};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub functions: BTreeSet<&'static str>,
    pub standards: BTreeSet<&'static str>,
}

impl Classification {
    pub fn implements(&self, standard: &str) -> bool {
        self.standards.contains(standard)
    }

    pub fn has_function(&self, signature: &str) -> bool {
        self.functions.contains(signature)
    }

    pub fn is_fungible_token(&self) -> bool {
        self.implements(selectors::ERC20)
    }

    pub fn is_non_fungible_token(&self) -> bool {
        self.implements(selectors::ERC721)
    }

    pub fn is_token(&self) -> bool {
        selectors::TOKEN_STANDARDS
            .iter()
            .any(|standard| self.implements(standard))
    }

    pub fn is_upgradeable_proxy(&self) -> bool {
        self.has_function(selectors::IMPLEMENTATION)
    }

    pub fn has_owner(&self) -> bool {
        self.has_function(selectors::OWNER)
    }
}

/// First four bytes of keccak256(signature), as 8 lowercase hex characters.
pub fn selector_hex(signature: &str) -> String {
    hex::encode(&keccak256(signature.as_bytes())[..4])
}

fn normalize(bytecode_hex: &str) -> String {
    bytecode_hex
        .strip_prefix("0x")
        .unwrap_or(bytecode_hex)
        .to_ascii_lowercase()
}

fn scan(code: &str, table: &[(&'static str, String)]) -> Classification {
    let functions: BTreeSet<&'static str> = table
        .iter()
        .filter(|(_, selector)| code.contains(selector.as_str()))
        .map(|(signature, _)| *signature)
        .collect();

    let standards = STANDARDS
        .iter()
        .filter(|(_, required)| required.iter().all(|sig| functions.contains(sig)))
        .map(|(name, _)| *name)
        .collect();

    Classification {
        functions,
        standards,
    }
}

fn selector_table() -> Vec<(&'static str, String)> {
    FUNCTIONS
        .iter()
        .map(|signature| (*signature, selector_hex(signature)))
        .collect()
}

/// Classifies `bytecode_hex` without touching any cache.
pub fn classify(bytecode_hex: &str) -> Classification {
    scan(&normalize(bytecode_hex), &selector_table())
}

/// Content-addressed classification cache shared by every updater.
pub struct ClassifierCache {
    selectors: Vec<(&'static str, String)>,
    entries: RwLock<HashMap<B256, Arc<Classification>>>,
}

impl Default for ClassifierCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierCache {
    pub fn new() -> Self {
        Self {
            selectors: selector_table(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn classify(&self, bytecode_hex: &str) -> Arc<Classification> {
        let code = normalize(bytecode_hex);
        let key = keccak256(code.as_bytes());

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = entries.get(&key) {
                return Arc::clone(hit);
            }
        }

        let classification = Arc::new(scan(&code, &self.selectors));
        debug!(
            "Classified bytecode {}: standards {:?}",
            key, classification.standards
        );

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // another worker may have raced us here; both results are identical
        Arc::clone(entries.entry(key).or_insert(classification))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
