//! Resource variants known to steward
//!
//! Every variant registers a decoder under its kind name. The registry is
//! built once on first use and never changes afterwards.

pub mod sysctl;

use declarative::Registry;
use std::sync::LazyLock;

static REGISTRY: LazyLock<Registry> =
    LazyLock::new(|| Registry::builder().register(sysctl::KIND, sysctl::decode).build());

/// The process-wide registry of resource variants
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_knows_sysctl() {
        assert!(registry().contains("sysctl"));
        assert_eq!(registry().kinds().collect::<Vec<_>>(), vec!["sysctl"]);
    }
}
