// src/ingest/providers/shopmy.rs
//! ShopMy: paginated creator earnings API, bearer token or session cookies.

use crate::ingest::fields::FieldMap;
use crate::ingest::http::{ApiEndpoint, JsonApiStrategy, Pagination};
use crate::ingest::providers::ConnectorDeps;
use crate::ingest::Connector;
use crate::model::Platform;

pub const LOGIN_MARKERS: &[&str] = &["login", "signin"];
pub const PER_PAGE: u32 = 100;

pub static API_FIELDS: FieldMap = FieldMap {
    order_id: &["id", "order_id", "transaction_id"],
    product_name: &["product_name", "product.name"],
    product_category: &["category", "product.category"],
    quantity: &["quantity"],
    order_amount: &["sale_amount", "order_total"],
    commission_amount: &["commission", "earnings"],
    commission_rate: &["commission_rate"],
    order_date: &["created_at", "order_date"],
    tracking_id: &["tracking_id", "link_id"],
    click_date: &["clicked_at"],
};

pub fn api_endpoint(base: &str, api: &str, max_pages: u32) -> ApiEndpoint {
    let base = base.trim_end_matches('/');
    ApiEndpoint {
        url: format!("{}/v1/creator/earnings", api.trim_end_matches('/')),
        origin: base.to_string(),
        referer: format!("{base}/dashboard"),
        start_param: "start_date",
        end_param: "end_date",
        items_keys: &["data", "earnings"],
        pagination: Some(Pagination {
            page_param: "page",
            per_page_param: "per_page",
            per_page: PER_PAGE,
            total_pages_pointer: "/meta/total_pages",
            max_pages,
        }),
        login_markers: LOGIN_MARKERS,
        fields: &API_FIELDS,
    }
}

pub fn connector(deps: &ConnectorDeps) -> Connector {
    let e = &deps.endpoints;
    deps.base(Platform::ShopMy).with_strategy(JsonApiStrategy::new(
        deps.http.clone(),
        api_endpoint(&e.shopmy_base, &e.shopmy_api, deps.max_pages),
    ))
}
