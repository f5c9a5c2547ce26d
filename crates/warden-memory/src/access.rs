//! The cross-group access matrix.
//!
//! Product isolation is absolute: a product-scoped memory is invisible
//! (L0 ceiling) to any accessor outside that product, owner or not.
//! Inside the right product — or for company scope — ownership raises
//! the ceiling to L2. Only main reads L3.

use warden_core::{GroupId, MemoryLevel, MemoryRecord, ProductId, TaskScope};

/// Who is asking.
#[derive(Debug, Clone)]
pub struct Accessor {
    /// The accessor's group folder.
    pub group: GroupId,
    /// Whether the accessor is the supervisory group.
    pub is_main: bool,
    /// The product the accessor is working in, if any.
    pub product: Option<ProductId>,
}

impl Accessor {
    /// An accessor for a plain group with no product context.
    #[must_use]
    pub fn group(group: impl Into<String>) -> Self {
        let group = GroupId::new(group);
        Self {
            is_main: group.is_main(),
            group,
            product: None,
        }
    }

    /// Attach a product context.
    #[must_use]
    pub fn with_product(mut self, product: ProductId) -> Self {
        self.product = Some(product);
        self
    }
}

/// The highest level this accessor may read on this memory.
#[must_use]
pub fn max_level(memory: &MemoryRecord, accessor: &Accessor) -> MemoryLevel {
    if accessor.is_main {
        return MemoryLevel::L3;
    }
    match memory.scope {
        TaskScope::Product => {
            let same_product = match (&memory.product_id, &accessor.product) {
                (Some(memory_product), Some(accessor_product)) => {
                    memory_product == accessor_product
                },
                _ => false,
            };
            if !same_product {
                MemoryLevel::L0
            } else if memory.group_folder == accessor.group {
                MemoryLevel::L2
            } else {
                MemoryLevel::L1
            }
        },
        TaskScope::Company => {
            if memory.group_folder == accessor.group {
                MemoryLevel::L2
            } else {
                MemoryLevel::L0
            }
        },
    }
}

/// Whether the accessor may read this memory at all.
#[must_use]
pub fn can_access(memory: &MemoryRecord, accessor: &Accessor) -> bool {
    memory.level <= max_level(memory, accessor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::MemoryId;

    fn memory(
        level: MemoryLevel,
        scope: TaskScope,
        product: Option<&str>,
        owner: &str,
    ) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::new(),
            content: "x".into(),
            content_hash: "00".repeat(32),
            level,
            scope,
            product_id: product.map(ProductId::new),
            group_folder: GroupId::from(owner),
            tags: vec![],
            pii_detected: false,
            pii_types: vec![],
            source_type: "test".into(),
            policy_version: 1,
            embedding: None,
            embedding_model: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn test_main_reads_everything() {
        let accessor = Accessor::group("main");
        let m = memory(MemoryLevel::L3, TaskScope::Product, Some("p1"), "developer");
        assert!(can_access(&m, &accessor));
    }

    #[test]
    fn test_product_isolation_is_absolute() {
        let m = memory(MemoryLevel::L1, TaskScope::Product, Some("p1"), "developer");

        // Owner group but wrong (or no) product: L0 ceiling.
        let no_product = Accessor::group("developer");
        assert_eq!(max_level(&m, &no_product), MemoryLevel::L0);
        assert!(!can_access(&m, &no_product));

        let other_product = Accessor::group("developer").with_product(ProductId::new("p2"));
        assert!(!can_access(&m, &other_product));
    }

    #[test]
    fn test_same_product_owner_gets_l2() {
        let m = memory(MemoryLevel::L2, TaskScope::Product, Some("p1"), "developer");
        let owner = Accessor::group("developer").with_product(ProductId::new("p1"));
        assert_eq!(max_level(&m, &owner), MemoryLevel::L2);
        assert!(can_access(&m, &owner));
    }

    #[test]
    fn test_same_product_non_owner_gets_l1() {
        let accessor = Accessor::group("security").with_product(ProductId::new("p1"));
        let l1 = memory(MemoryLevel::L1, TaskScope::Product, Some("p1"), "developer");
        let l2 = memory(MemoryLevel::L2, TaskScope::Product, Some("p1"), "developer");
        assert!(can_access(&l1, &accessor));
        assert!(!can_access(&l2, &accessor));
    }

    #[test]
    fn test_company_scope_owner_vs_stranger() {
        let l2 = memory(MemoryLevel::L2, TaskScope::Company, None, "developer");
        assert!(can_access(&l2, &Accessor::group("developer")));
        assert!(!can_access(&l2, &Accessor::group("security")));

        let l0 = memory(MemoryLevel::L0, TaskScope::Company, None, "developer");
        assert!(can_access(&l0, &Accessor::group("security")));
    }

    #[test]
    fn test_l3_denied_to_non_main_even_owner() {
        let m = memory(MemoryLevel::L3, TaskScope::Company, None, "developer");
        assert!(!can_access(&m, &Accessor::group("developer")));
    }
}
