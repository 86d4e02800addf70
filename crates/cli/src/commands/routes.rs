//! Route catalog listing.

use homeplate_access::catalog::marketplace_routes;
use homeplate_access::{AccessPolicy, RouteError, RouteTable};

/// Print every route with its policy and component.
///
/// # Errors
///
/// Returns `RouteError` if the catalog cannot be built.
pub fn list() -> Result<(), RouteError> {
    let routes = marketplace_routes()?;
    for line in render(&routes) {
        print_line(&line);
    }
    Ok(())
}

/// One aligned line per route, public routes first.
fn render(routes: &RouteTable<&'static str>) -> Vec<String> {
    let mut entries: Vec<_> = routes.iter().collect();
    entries.sort_by_key(|route| (*route.policy() != AccessPolicy::Public, route.pattern().to_owned()));

    entries
        .into_iter()
        .map(|route| {
            format!(
                "{:<30} {:<26} {}",
                route.pattern(),
                route.policy().to_string(),
                route.component()
            )
        })
        .collect()
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
