use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use quickdrop_agents::{AgentStatus, AgentWallet};
use quickdrop_orders::{Order, PurchaseType};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterStoreRequest {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    /// Admins may register a store on behalf of a store user.
    pub owner_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: String,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub store_id: String,
    pub category_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: u64,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductAvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub store_id: Option<String>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub include_unavailable: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub store_id: String,
    pub lines: Vec<CheckoutLineRequest>,
    pub delivery_address: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub full_name: String,
    pub phone: String,
    pub vehicle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentAvailabilityRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct AcceptJobRequest {
    pub purchase_type: PurchaseType,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseJobRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveCashRequest {
    /// Defaults to the requested amount.
    pub amount: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignJobRequest {
    pub agent_id: String,
    pub purchase_type: PurchaseType,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// The identity provider's subject; generated when absent.
    pub user_id: Option<String>,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentsQuery {
    pub status: Option<AgentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenWalletRequest {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct RemittanceRequest {
    pub amount: u64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Signed minor units.
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated table names.
    pub tables: Option<String>,
}

// -------------------------
// Response shapes
// -------------------------

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let count = items.len();
        Self { items, count }
    }
}

/// Order state straight from its stream, for command responses.
pub fn order_snapshot(order: &Order) -> JsonValue {
    json!({
        "id": order.id_typed().0.to_string(),
        "status": order.status(),
        "payment_status": order.payment_status(),
        "purchase_type": order.purchase_type(),
        "customer_id": order.customer_id(),
        "store_id": order.store_id(),
        "agent_id": order.agent_id(),
        "items": order.items(),
        "subtotal": order.subtotal(),
        "total": order.total(),
        "cash_requested": order.cash_requested(),
        "cash_approved": order.cash_approved(),
        "purchase_cost": order.purchase_cost(),
        "receipt_url": order.receipt_url(),
    })
}

pub fn wallet_snapshot(wallet: &AgentWallet) -> JsonValue {
    json!({
        "agent_id": wallet.agent_id(),
        "company_cash_balance": wallet.balance(),
        "limit": wallet.limit(),
        "available_credit": wallet.available_credit(),
        "status": wallet.status(),
        "transaction_count": wallet.transactions().len(),
    })
}
