// Data model: artifacts, links, steps, inspections, layouts, rules.
//
// Field names loosely follow the in-toto link/layout schema; serialization
// is project-defined (§6) so the core only promises the shapes below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping from hash-algorithm name to hex digest string.
///
/// `BTreeMap` gives us both set-style equality (two artifacts with the same
/// algorithm/digest pairs compare equal regardless of insertion order) and a
/// stable, sorted serialization for free.
pub type ArtifactDigest = BTreeMap<String, String>;

/// Ordered mapping from artifact path to digest. Stored as a `BTreeMap` too:
/// verification never depends on insertion order (§3 Artifact Set), and a
/// sorted map is what gets canonicalized for signing.
pub type ArtifactSet = BTreeMap<String, ArtifactDigest>;

/// Free-form byproduct bag; `return-value` carries an inspection's exit code.
pub type Byproducts = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Link,
    Layout,
}

/// An opaque signature entry: a keyid plus whatever bytes the signature
/// subsystem produced. The core never inspects the signature bytes itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    #[serde(with = "hex_bytes")]
    pub sig: Vec<u8>,
}

/// A public key record, keyed by `keyid` in `Layout::keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    pub keyid: String,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
}

/// A signed attestation for one execution of one step or inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub materials: ArtifactSet,
    #[serde(default)]
    pub products: ArtifactSet,
    #[serde(default)]
    pub byproducts: Byproducts,
    pub kind: LinkKind,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    /// Present iff `kind == LinkKind::Layout`: the nested layout this chain
    /// entry actually represents (§4.6). `materials`/`products`/etc. are
    /// meaningless for a sublayout entry and left empty.
    #[serde(default)]
    pub sublayout: Option<Box<Layout>>,
}

impl Link {
    /// An empty link of the given name/kind, for building up test fixtures
    /// and for the summary synthesizer (C9).
    pub fn new(name: &str, kind: LinkKind) -> Self {
        Self {
            name: name.to_string(),
            command: Vec::new(),
            materials: ArtifactSet::new(),
            products: ArtifactSet::new(),
            byproducts: Byproducts::new(),
            kind,
            signatures: Vec::new(),
            sublayout: None,
        }
    }

    /// Bytes the signature subsystem signs/verifies: everything but the
    /// signatures themselves, serialized with sorted map keys.
    #[allow(clippy::expect_used)] // Link's fields are all serde-derived; serialization cannot fail.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        serde_json::to_vec(&unsigned).expect("Link serializes infallibly")
    }
}

/// One clause of an `expected_materials` / `expected_products` list (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Match {
        pattern: String,
        source_prefix: Option<String>,
        dest_kind: ArtifactKind,
        dest_prefix: Option<String>,
        dest_step: String,
    },
    Create {
        pattern: String,
    },
    Delete {
        pattern: String,
    },
    Modify {
        pattern: String,
    },
    Allow {
        pattern: String,
    },
    Disallow {
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Materials,
    Products,
}

/// A node in the layout DAG (modeled as an ordered sequence, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub expected_command: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    pub pubkeys: Vec<String>,
    #[serde(default)]
    pub expected_materials: Vec<Vec<String>>,
    #[serde(default)]
    pub expected_products: Vec<Vec<String>>,
}

fn default_threshold() -> u32 {
    1
}

/// An inspection: same rule lists as a step, plus a local `run` argv.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub name: String,
    pub run: Vec<String>,
    #[serde(default)]
    pub expected_materials: Vec<Vec<String>>,
    #[serde(default)]
    pub expected_products: Vec<Vec<String>>,
}

/// The signed declarative policy the whole chain is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub keys: BTreeMap<String, PublicKey>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub inspect: Vec<Inspection>,
    /// ISO-8601 UTC timestamp, e.g. `2030-01-01T00:00:00Z`.
    pub expires: String,
    #[serde(default)]
    pub signatures: Vec<Signature>,
}

impl Layout {
    #[allow(clippy::expect_used)] // Layout's fields are all serde-derived; serialization cannot fail.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        serde_json::to_vec(&unsigned).expect("Layout serializes infallibly")
    }

    /// Find a step or inspection name colliding with another (§ supplemented
    /// feature 3): the chain-link dict, threshold reduction, and rule
    /// evaluation are all keyed by name, so a collision would silently merge
    /// two unrelated items.
    pub fn duplicate_item_name(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.steps
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.inspect.iter().map(|i| i.name.as_str()))
            .find(|name| !seen.insert(*name))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
