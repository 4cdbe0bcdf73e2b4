/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Static capability table for the bakery roles. The check is a pure
 * function so the HTTP layer, the CLI and tests can all consult it.
 */

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;

/// Caller role as supplied by the identity layer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    #[serde(alias = "cliente")]
    #[strum(to_string = "customer", serialize = "cliente")]
    Customer,
    #[serde(alias = "vendedor")]
    #[strum(to_string = "seller", serialize = "vendedor")]
    Seller,
    Chef,
    #[serde(alias = "administrador")]
    #[strum(to_string = "admin", serialize = "administrador")]
    Admin,
}

impl Role {
    pub fn description(self) -> &'static str {
        match self {
            Role::Customer => "Bakery customer who browses, buys and follows their orders",
            Role::Seller => "Sales staff handling orders, customers and the catalog",
            Role::Chef => "Kitchen lead supervising production and supplies",
            Role::Admin => "Administrator with access to every area",
        }
    }

    pub fn is_administrative(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Everything a caller can be allowed to do
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    ViewProducts,
    ManageCart,
    PlaceOrder,
    ViewOwnOrders,
    ManageProducts,
    ManageCategories,
    ManageOrders,
    UpdateOrderStatus,
    ViewKitchenOrders,
    ViewInventory,
    ManageInventory,
    ViewSalesReports,
    ViewAllStatistics,
    ManageUsers,
    ConfigureSystem,
}

/// Dashboards of the back office
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Dashboard {
    Customer,
    Seller,
    Chef,
    Admin,
}

lazy_static! {
    pub static ref CAPABILITIES: HashMap<Role, HashSet<Action>> = {
        use Action::*;

        let mut roles = HashMap::new();

        roles.insert(
            Role::Customer,
            HashSet::from([ViewProducts, ManageCart, PlaceOrder, ViewOwnOrders]),
        );

        roles.insert(
            Role::Seller,
            HashSet::from([
                ViewProducts,
                ManageProducts,
                ManageOrders,
                UpdateOrderStatus,
                PlaceOrder,
                ViewInventory,
                ViewSalesReports,
            ]),
        );

        roles.insert(
            Role::Chef,
            HashSet::from([
                ViewKitchenOrders,
                UpdateOrderStatus,
                ViewInventory,
                ManageInventory,
            ]),
        );

        // Admin can open every back-office dashboard, so it gets every action
        roles.insert(Role::Admin, Action::iter().collect());

        roles
    };
}

/// Pure capability check
pub fn has_permission(role: Role, action: Action) -> bool {
    CAPABILITIES
        .get(&role)
        .map(|actions| actions.contains(&action))
        .unwrap_or(false)
}

/// All actions granted to a role, in declaration order
pub fn permissions_for(role: Role) -> Vec<Action> {
    Action::iter()
        .filter(|action| has_permission(role, *action))
        .collect()
}

pub fn can_access_dashboard(role: Role, dashboard: Dashboard) -> bool {
    match role {
        Role::Admin => !matches!(dashboard, Dashboard::Customer),
        Role::Customer => dashboard == Dashboard::Customer,
        Role::Seller => dashboard == Dashboard::Seller,
        Role::Chef => dashboard == Dashboard::Chef,
    }
}
