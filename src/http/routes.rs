use crate::app::AppContext;
use axum::Router;

/// Trait for composable route modules
///
/// Each module contributes a group of routes that is merged into the
/// application router. Handlers use `State<AppContext>` to reach shared state.
///
/// # Example
///
/// ```ignore
/// struct StatusModule;
///
/// impl RouteModule for StatusModule {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new().route("/status", get(status))
///     }
/// }
/// ```
pub trait RouteModule {
    /// Routes of this module, without state applied.
    fn routes(&self) -> Router<AppContext>;

    /// Optional path prefix for all routes in this module
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Registers this module's routes into the application router
    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
