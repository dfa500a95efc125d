use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Almacen API",
        version = "0.3.0",
        description = r#"
Lot-tracked inventory, FEFO reservations, purchasing with goods receipt,
and price/exchange-rate historization for a distribution business.

Identity arrives from the upstream gateway via `x-user-id` /
`x-user-permissions` headers; mutating endpoints check a capability string
per resource.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "inventario", description = "Lot positions, movements and alerts"),
        (name = "anticipos", description = "Reservations against advance payments"),
        (name = "compras", description = "Purchases and goods receipts"),
        (name = "precios", description = "Price history and recalculation"),
        (name = "finanzas", description = "Exchange rates")
    ),
    paths(
        crate::handlers::inventory::list_positions,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::verify_position,
        crate::handlers::inventory::set_minimum,
        crate::handlers::inventory::transfer,
        crate::handlers::inventory::list_alerts,
        crate::handlers::inventory::alert_summary,
        crate::handlers::inventory::top_alerts,
        crate::handlers::reservations::reserve,
        crate::handlers::reservations::release,
        crate::handlers::reservations::release_all,
        crate::handlers::reservations::apply,
        crate::handlers::reservations::detail,
        crate::handlers::purchases::create_purchase,
        crate::handlers::purchases::list_purchases,
        crate::handlers::purchases::get_purchase,
        crate::handlers::purchases::delete_purchase,
        crate::handlers::purchases::change_status,
        crate::handlers::purchases::add_line,
        crate::handlers::purchases::update_line,
        crate::handlers::purchases::remove_line,
        crate::handlers::purchases::create_reception,
        crate::handlers::purchases::get_reception,
        crate::handlers::purchases::add_reception_items,
        crate::handlers::purchases::close_reception,
        crate::handlers::prices::manual_change,
        crate::handlers::prices::current_price,
        crate::handlers::prices::timeline,
        crate::handlers::prices::mass_recalculate,
        crate::handlers::prices::revert,
        crate::handlers::prices::search,
        crate::handlers::prices::get_rounding,
        crate::handlers::prices::set_rounding,
        crate::handlers::exchange_rates::create_rate,
        crate::handlers::exchange_rates::vigente_rate,
        crate::handlers::exchange_rates::convert,
        crate::handlers::exchange_rates::rate_history,
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
