//! Client-held shopping cart.
//!
//! The cart lives on the client between visits; the server rebuilds one from
//! catalog snapshots at checkout and turns it into a [`PlaceOrder`] command.
//! A cart only ever holds products from a single store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_catalog::{ProductId, StoreId};
use quickdrop_core::{DomainError, DomainResult, Money, TenantId, UserId};

use crate::order::{NewOrderItem, OrderCommand, OrderId, PlaceOrder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    store_id: Option<StoreId>,
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Add `quantity` units of a product. Adding a product already in the
    /// cart increases its quantity and refreshes the price snapshot.
    pub fn add(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        match self.store_id {
            Some(current) if current != store_id => {
                return Err(DomainError::invariant(
                    "cart already holds items from another store",
                ));
            }
            _ => self.store_id = Some(store_id),
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| DomainError::validation("quantity overflow"))?;
            line.unit_price = unit_price;
            line.name = name.into();
        } else {
            self.lines.push(CartLine {
                product_id,
                name: name.into(),
                unit_price,
                quantity,
            });
        }
        Ok(())
    }

    /// Set a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(DomainError::not_found)?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, product_id: ProductId) {
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.is_empty() {
            self.store_id = None;
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.store_id = None;
    }

    pub fn subtotal(&self) -> DomainResult<Money> {
        self.lines.iter().try_fold(Money::ZERO, |acc, line| {
            acc.checked_add(line.unit_price.checked_mul(line.quantity)?)
        })
    }

    /// Consume the cart into the command that places it as an order.
    #[allow(clippy::too_many_arguments)]
    pub fn into_place_order(
        self,
        tenant_id: TenantId,
        order_id: OrderId,
        customer_id: UserId,
        delivery_address: impl Into<String>,
        notes: Option<String>,
        delivery_fee: Money,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<OrderCommand> {
        let store_id = self
            .store_id
            .ok_or_else(|| DomainError::validation("cart is empty"))?;

        let items = self
            .lines
            .into_iter()
            .map(|l| NewOrderItem {
                product_id: l.product_id,
                name: l.name,
                unit_price: l.unit_price,
                quantity: l.quantity,
            })
            .collect();

        Ok(OrderCommand::Place(PlaceOrder {
            tenant_id,
            order_id,
            customer_id,
            store_id,
            items,
            delivery_address: delivery_address.into(),
            notes,
            delivery_fee,
            occurred_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quickdrop_core::AggregateId;

    fn store() -> StoreId {
        StoreId::new(AggregateId::new())
    }

    fn product() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    #[test]
    fn adding_same_product_merges_lines() {
        let mut cart = Cart::new();
        let s = store();
        let p = product();
        cart.add(s, p, "Eggs", Money::from_minor(300), 1).unwrap();
        cart.add(s, p, "Eggs (12)", Money::from_minor(320), 2).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal().unwrap(), Money::from_minor(960));
        assert_eq!(cart.lines()[0].name, "Eggs (12)");
    }

    #[test]
    fn second_store_is_rejected() {
        let mut cart = Cart::new();
        cart.add(store(), product(), "Bread", Money::from_minor(200), 1).unwrap();
        let err = cart
            .add(store(), product(), "Cheese", Money::from_minor(500), 1)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn emptying_cart_frees_the_store() {
        let mut cart = Cart::new();
        let p = product();
        cart.add(store(), p, "Bread", Money::from_minor(200), 1).unwrap();
        cart.set_quantity(p, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.store_id(), None);
        cart.add(store(), product(), "Cheese", Money::from_minor(500), 1).unwrap();
    }

    #[test]
    fn set_quantity_on_missing_line_is_not_found() {
        let mut cart = Cart::new();
        assert_eq!(cart.set_quantity(product(), 2), Err(DomainError::NotFound));
    }

    #[test]
    fn empty_cart_cannot_be_placed() {
        let err = Cart::new()
            .into_place_order(
                TenantId::new(),
                OrderId::new(AggregateId::new()),
                UserId::new(),
                "addr",
                None,
                Money::ZERO,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn place_order_carries_snapshots() {
        let mut cart = Cart::new();
        let s = store();
        let p = product();
        cart.add(s, p, "Rice 5kg", Money::from_minor(1299), 2).unwrap();

        let OrderCommand::Place(cmd) = cart
            .into_place_order(
                TenantId::new(),
                OrderId::new(AggregateId::new()),
                UserId::new(),
                "7 Hill St",
                Some("ring twice".to_string()),
                Money::from_minor(500),
                Utc::now(),
            )
            .unwrap()
        else {
            panic!("expected Place command");
        };
        assert_eq!(cmd.store_id, s);
        assert_eq!(cmd.items[0].product_id, p);
        assert_eq!(cmd.items[0].unit_price, Money::from_minor(1299));
        assert_eq!(cmd.items[0].quantity, 2);
    }

    proptest! {
        #[test]
        fn subtotal_matches_line_sum(
            lines in prop::collection::vec((1u64..50_000, 1u32..50), 0..10)
        ) {
            let mut cart = Cart::new();
            let s = store();
            for (price, qty) in &lines {
                cart.add(s, product(), "item", Money::from_minor(*price), *qty).unwrap();
            }
            let expected: u64 = lines.iter().map(|(p, q)| p * u64::from(*q)).sum();
            prop_assert_eq!(cart.subtotal().unwrap().minor(), expected);
            prop_assert_eq!(cart.item_count(), lines.iter().map(|(_, q)| q).sum::<u32>());
        }
    }
}
