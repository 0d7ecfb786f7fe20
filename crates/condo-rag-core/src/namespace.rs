//! Tenant → partition key resolution.
//!
//! Every `(tenant_id, sub_tenant_id)` pair maps to its own vector-store
//! namespace. The key embeds both ids in decimal between fixed literal
//! delimiters, so distinct pairs can never render to the same key.
//!
//! The reserved pair `(0, 0)` is the shared general-knowledge partition.
//! It is reference material and is only surfaced to tenants under an
//! explicit label (see [`SearchMode`](crate::models::SearchMode)).

use std::fmt;

/// A vector-store partition owned by one tenant/sub-tenant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    tenant_id: u64,
    sub_tenant_id: u64,
}

/// Resolve a tenant identity to its namespace.
///
/// Total and deterministic; ids are unsigned, so negative ids are rejected
/// by the caller's type conversion before they reach this point.
pub fn resolve(tenant_id: u64, sub_tenant_id: u64) -> Namespace {
    Namespace {
        tenant_id,
        sub_tenant_id,
    }
}

impl Namespace {
    /// The shared general-knowledge partition.
    pub const fn general() -> Self {
        Namespace {
            tenant_id: 0,
            sub_tenant_id: 0,
        }
    }

    pub fn is_general(&self) -> bool {
        self.tenant_id == 0 && self.sub_tenant_id == 0
    }

    pub fn tenant_id(&self) -> u64 {
        self.tenant_id
    }

    pub fn sub_tenant_id(&self) -> u64 {
        self.sub_tenant_id
    }

    /// Backend partition key, e.g. `user_3_cond_12`.
    pub fn key(&self) -> String {
        format!("user_{}_cond_{}", self.tenant_id, self.sub_tenant_id)
    }

    /// Inverse of [`key`](Namespace::key).
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix("user_")?;
        let (tenant, sub) = rest.split_once("_cond_")?;
        Some(resolve(tenant.parse().ok()?, sub.parse().ok()?))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}_cond_{}", self.tenant_id, self.sub_tenant_id)
    }
}
