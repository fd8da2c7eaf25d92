//! Livery-based role classification.

use std::collections::BTreeSet;

use contracts::{PoliceConfig, Role, VehicleDescriptor};
use serde_json::Value;

/// Keys whose string values name a vehicle's skin or paint.
const LIVERY_KEYS: [&str; 3] = ["skin", "paint_design", "livery"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleClassifier {
    pursuer_liveries: BTreeSet<String>,
}

impl RoleClassifier {
    pub fn new(config: &PoliceConfig) -> Self {
        Self {
            pursuer_liveries: config
                .pursuer_liveries
                .iter()
                .map(|livery| livery.trim().to_ascii_lowercase())
                .filter(|livery| !livery.is_empty())
                .collect(),
        }
    }

    /// A participant without a descriptor, or whose descriptor carries no
    /// recognised livery, is a target.
    pub fn classify(&self, descriptor: Option<&VehicleDescriptor>) -> Role {
        let Some(descriptor) = descriptor else {
            return Role::Target;
        };
        if livery_identifiers(descriptor)
            .iter()
            .any(|identifier| self.is_pursuer_livery(identifier))
        {
            Role::Pursuer
        } else {
            Role::Target
        }
    }

    fn is_pursuer_livery(&self, identifier: &str) -> bool {
        let lowered = identifier.trim().to_ascii_lowercase();
        self.pursuer_liveries.contains(&lowered)
            || self.pursuer_liveries.contains(livery_stem(&lowered))
    }
}

/// Every livery string found in the first JSON object embedded in the
/// descriptor. Unparseable descriptors yield nothing.
pub fn livery_identifiers(descriptor: &VehicleDescriptor) -> Vec<String> {
    let raw = descriptor.0.as_str();
    let Some(start) = raw.find('{') else {
        return Vec::new();
    };
    let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
    let Some(Ok(fragment)) = stream.next() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    collect_liveries(&fragment, &mut found);
    found
}

fn collect_liveries(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if let Value::String(text) = child {
                    if LIVERY_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                        found.push(text.clone());
                    }
                } else {
                    collect_liveries(child, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_liveries(item, found);
            }
        }
        _ => {}
    }
}

/// `vehicles/sedan/police.dds` -> `police`.
fn livery_stem(identifier: &str) -> &str {
    let file = identifier
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(identifier);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}
