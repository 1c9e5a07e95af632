//! The profile catalog: declarative tables the generic engine consumes.
//!
//! Adding a profile means adding a table here; the decode/encode engine,
//! the gateway and the capability machinery need no changes.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::id::EepId;
use super::profile::EepSpecification;

mod a5_02;
mod a5_04;
mod a5_06;
mod a5_12;
mod a5_38_08;
mod d2_05_00;
mod d5_00_01;
mod f6_02;

static CATALOG: Lazy<HashMap<EepId, Arc<EepSpecification>>> = Lazy::new(|| {
    let groups = [
        f6_02::profiles(),
        d5_00_01::profiles(),
        a5_02::profiles(),
        a5_04::profiles(),
        a5_06::profiles(),
        a5_12::profiles(),
        a5_38_08::profiles(),
        d2_05_00::profiles(),
    ];
    let mut catalog = HashMap::new();
    for spec in groups.into_iter().flatten() {
        catalog.insert(spec.eep, Arc::new(spec));
    }
    catalog
});

/// Look up the specification for an EEP id.
pub fn find(eep: &EepId) -> Option<Arc<EepSpecification>> {
    CATALOG.get(eep).cloned()
}

pub fn is_known(eep: &EepId) -> bool {
    CATALOG.contains_key(eep)
}

/// Every profile in the catalog, in no particular order.
pub fn all() -> impl Iterator<Item = &'static Arc<EepSpecification>> {
    CATALOG.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_catalog_then_known_profiles_resolve() {
        for eep in ["F6-02-01", "F6-02-02", "D5-00-01", "A5-02-05", "A5-04-01", "A5-06-01", "A5-06-01.ELTAKO", "A5-12-01", "A5-38-08", "D2-05-00"] {
            let id = EepId::from_string(eep).unwrap();
            assert!(is_known(&id), "{eep} missing from catalog");
            assert_eq!(find(&id).unwrap().eep, id);
        }
        assert!(!is_known(&EepId::new(0xA5, 0x7F, 0x7F)));
    }

    #[test]
    fn given_catalog_then_every_key_matches_its_specification() {
        for spec in all() {
            assert_eq!(find(&spec.eep).unwrap().eep, spec.eep);
            assert!(!spec.telegrams.is_empty(), "{} has no telegrams", spec.eep);
        }
    }
}
