use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier such as `"orders.place"`.
///
/// `"*"` is the wildcard granted to admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
    pub const CATALOG_CATEGORIES_MANAGE: Permission =
        Permission::from_static("catalog.categories.manage");
    pub const CATALOG_STORES_MANAGE: Permission = Permission::from_static("catalog.stores.manage");
    pub const CATALOG_STORES_MODERATE: Permission =
        Permission::from_static("catalog.stores.moderate");
    pub const CATALOG_PRODUCTS_MANAGE: Permission =
        Permission::from_static("catalog.products.manage");
    pub const STORAGE_UPLOAD: Permission = Permission::from_static("storage.upload");

    pub const ORDERS_PLACE: Permission = Permission::from_static("orders.place");
    pub const ORDERS_OWN_READ: Permission = Permission::from_static("orders.own.read");
    pub const ORDERS_OWN_CANCEL: Permission = Permission::from_static("orders.own.cancel");
    pub const ORDERS_STORE_READ: Permission = Permission::from_static("orders.store.read");
    pub const ORDERS_STORE_REJECT: Permission = Permission::from_static("orders.store.reject");
    pub const ORDERS_JOBS_READ: Permission = Permission::from_static("orders.jobs.read");
    pub const ORDERS_JOBS_ACCEPT: Permission = Permission::from_static("orders.jobs.accept");
    pub const ORDERS_FULFILL: Permission = Permission::from_static("orders.fulfill");
    pub const ORDERS_ADMIN: Permission = Permission::from_static("orders.admin");

    pub const AGENTS_PROFILE_MANAGE: Permission = Permission::from_static("agents.profile.manage");
    pub const AGENTS_ADMIN: Permission = Permission::from_static("agents.admin");
    pub const WALLETS_OWN_READ: Permission = Permission::from_static("wallets.own.read");
    pub const WALLETS_ADMIN: Permission = Permission::from_static("wallets.admin");

    pub const USERS_ADMIN: Permission = Permission::from_static("users.admin");
    pub const STATS_READ: Permission = Permission::from_static("stats.read");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
