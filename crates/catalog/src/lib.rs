//! Store, category and product management.

pub mod category;
pub mod product;
pub mod store;

pub use category::{Category, CategoryCommand, CategoryEvent, CategoryId};
pub use product::{Product, ProductCommand, ProductEvent, ProductId, ProductStatus};
pub use store::{Store, StoreCommand, StoreEvent, StoreId, StoreStatus};

/// Trim a required text field, rejecting blanks.
pub(crate) fn required_text(
    field: &str,
    value: &str,
) -> Result<String, quickdrop_core::DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(quickdrop_core::DomainError::validation(format!(
            "{field} cannot be empty"
        )));
    }
    Ok(trimmed.to_string())
}
