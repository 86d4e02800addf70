//! The marketplace's route set.
//!
//! Components are identified by name; the UI layer maps names to views.

use homeplate_core::Role;

use crate::gate::AccessPolicy;
use crate::routes::{RouteError, RouteTable};

const PUBLIC: &[(&str, &str)] = &[
    ("/", "home"),
    ("/menu", "menu"),
    ("/chefs", "chef-directory"),
    ("/chefs/:chef_id", "chef-profile"),
    ("/kitchens/:kitchen_id", "kitchen-profile"),
    ("/restaurants/:restaurant_id", "restaurant-profile"),
    ("/auth", "auth"),
    ("/auth/callback", "auth-callback"),
    ("/about", "about"),
];

const AUTHENTICATED: &[(&str, &str)] = &[
    ("/account", "account"),
    ("/application-status", "application-status"),
    ("/apply/chef", "chef-application"),
    ("/apply/kitchen-partner", "kitchen-partner-application"),
    ("/apply/restaurant", "restaurant-application"),
];

/// Build the marketplace route table.
///
/// # Errors
///
/// Returns `RouteError` if two entries collide; the set is static, so this
/// only fails if the table itself is edited incorrectly.
pub fn marketplace_routes() -> Result<RouteTable<&'static str>, RouteError> {
    let mut table = RouteTable::new();

    for &(path, component) in PUBLIC {
        table.register_route(path, AccessPolicy::Public, component)?;
    }
    for &(path, component) in AUTHENTICATED {
        table.register_route(path, AccessPolicy::AnyAuthenticated, component)?;
    }

    table.register_route("/cart", AccessPolicy::role(Role::Customer), "cart")?;
    table.register_route("/orders", AccessPolicy::role(Role::Customer), "orders")?;
    table.register_route(
        "/orders/:order_id",
        AccessPolicy::role(Role::Customer),
        "order-detail",
    )?;

    table.register_route("/chef/dashboard", AccessPolicy::approved(Role::Chef), "chef-dashboard")?;
    table.register_route("/chef/menu", AccessPolicy::approved(Role::Chef), "chef-menu")?;
    table.register_route("/chef/orders", AccessPolicy::approved(Role::Chef), "chef-orders")?;

    table.register_route(
        "/kitchen-partner/dashboard",
        AccessPolicy::approved(Role::KitchenPartner),
        "kitchen-partner-dashboard",
    )?;
    table.register_route(
        "/kitchen-partner/bookings",
        AccessPolicy::approved(Role::KitchenPartner),
        "kitchen-partner-bookings",
    )?;

    table.register_route(
        "/restaurant/dashboard",
        AccessPolicy::approved(Role::Restaurant),
        "restaurant-dashboard",
    )?;
    table.register_route(
        "/restaurant/menu",
        AccessPolicy::approved(Role::Restaurant),
        "restaurant-menu",
    )?;

    table.register_route("/admin", AccessPolicy::role(Role::Admin), "admin-dashboard")?;
    table.register_route("/admin/*", AccessPolicy::role(Role::Admin), "admin")?;

    Ok(table)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::RedirectTargets;

    #[test]
    fn test_catalog_builds() {
        let table = marketplace_routes().unwrap();
        assert!(table.len() > 20);
    }

    #[test]
    fn test_role_homes_are_routed_to_their_role() {
        let table = marketplace_routes().unwrap();
        let targets = RedirectTargets::default();

        for role in Role::ALL {
            let home = targets.role_home(role);
            let policy = table.policy_for(home).unwrap();
            assert!(
                matches!(policy, AccessPolicy::Public) || policy.required_role() == Some(role),
                "{home} is not reachable by {role}"
            );
        }
    }

    #[test]
    fn test_redirect_targets_are_not_gated_by_role() {
        let table = marketplace_routes().unwrap();
        let targets = RedirectTargets::default();
        assert_eq!(table.policy_for(&targets.auth_path).unwrap(), AccessPolicy::Public);
        assert_eq!(
            table.policy_for(&targets.pending_path).unwrap(),
            AccessPolicy::AnyAuthenticated
        );
    }

    #[test]
    fn test_vetted_dashboards_require_approval() {
        let table = marketplace_routes().unwrap();
        assert_eq!(
            table.policy_for("/chef/dashboard").unwrap(),
            AccessPolicy::approved(Role::Chef)
        );
        assert_eq!(
            table.policy_for("/admin/applications").unwrap(),
            AccessPolicy::role(Role::Admin)
        );
    }
}
