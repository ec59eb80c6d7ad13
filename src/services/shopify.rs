//! Storefront product catalog and merchant order adapter.
//!
//! Product reads go through a short-TTL cache with a long-lived stale copy
//! served when the storefront is down; order creation goes through the Admin
//! GraphQL API with a single rate-limit-aware retry.

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::product::{ProductDetail, ProductVariant};
use crate::services::usdc_math::USDC_DECIMALS;

const STOREFRONT_API_VERSION: &str = "2024-10";
const ADMIN_API_VERSION: &str = "2026-01";

const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(60);
const STALE_CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_MAX_ENTRIES: u64 = 200;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum CatalogError {
    ProductNotFound(String),
    Upstream(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::ProductNotFound(id) => write!(f, "Product {} not found", id),
            CatalogError::Upstream(msg) => write!(f, "storefront error: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Order creation failed; the payment reference rides along for correlation.
#[derive(Debug)]
pub struct OrderError {
    pub message: String,
    pub payment_reference: String,
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (payment {})", self.message, self.payment_reference)
    }
}

impl std::error::Error for OrderError {}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: &str) -> Result<ProductDetail, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub product_title: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub price_usdc: String,
    pub total_usdc: String,
    pub payment_reference: String,
}

#[derive(Debug, Clone)]
pub struct CreateOrderResult {
    pub merchant_order_id: String,
    pub order_number: String,
}

#[async_trait]
pub trait OrderAdapter: Send + Sync {
    async fn create_order(&self, params: CreateOrderParams)
        -> Result<CreateOrderResult, OrderError>;
}

// --- GraphQL wire types ---

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct Money {
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageNode {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantNode {
    id: String,
    title: String,
    price: Money,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Edges<T> {
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceRange {
    min_variant_price: Money,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNode {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    images: Option<Edges<ImageNode>>,
    price_range: PriceRange,
    variants: Edges<VariantNode>,
}

#[derive(Debug, Deserialize)]
struct GetProductData {
    product: Option<ProductNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateData {
    order_create: OrderCreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreatePayload {
    order: Option<CreatedOrder>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

const GET_PRODUCT_QUERY: &str = r#"
  query GetProduct($id: ID!) {
    product(id: $id) {
      id
      title
      description
      images(first: 10) {
        edges {
          node {
            url
          }
        }
      }
      priceRange {
        minVariantPrice {
          amount
          currencyCode
        }
      }
      variants(first: 100) {
        edges {
          node {
            id
            title
            price {
              amount
              currencyCode
            }
          }
        }
      }
    }
  }
"#;

const ORDER_CREATE_MUTATION: &str = r#"
  mutation orderCreate($order: OrderCreateOrderInput!) {
    orderCreate(order: $order) {
      order {
        id
        name
      }
      userErrors {
        field
        message
      }
    }
  }
"#;

/// Normalize a storefront money amount to six fractional digits.
fn money_to_usdc(amount: &str) -> String {
    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    let whole = if whole.is_empty() { "0" } else { whole };
    let mut frac = frac.to_string();
    frac.truncate(USDC_DECIMALS as usize);
    while frac.len() < USDC_DECIMALS as usize {
        frac.push('0');
    }
    format!("{}.{}", whole, frac)
}

fn map_product(node: ProductNode) -> ProductDetail {
    ProductDetail {
        price_usdc: money_to_usdc(&node.price_range.min_variant_price.amount),
        id: node.id,
        title: node.title,
        description: node.description,
        images: node
            .images
            .map(|images| images.edges.into_iter().map(|e| e.node.url).collect())
            .unwrap_or_default(),
        variants: node
            .variants
            .edges
            .into_iter()
            .map(|e| ProductVariant {
                id: e.node.id,
                title: e.node.title,
                price_usdc: money_to_usdc(&e.node.price.amount),
            })
            .collect(),
    }
}

#[derive(Debug)]
enum AdminError {
    RateLimited { retry_after: Duration },
    Api { message: String },
}

impl std::fmt::Display for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminError::RateLimited { .. } => write!(f, "admin API rate limited"),
            AdminError::Api { message } => write!(f, "{}", message),
        }
    }
}

pub struct ShopifyService {
    http: reqwest::Client,
    storefront_endpoint: String,
    admin_endpoint: String,
    access_token: String,
    storefront_token: Option<String>,
    fresh: Cache<String, ProductDetail>,
    stale: Cache<String, ProductDetail>,
}

impl ShopifyService {
    pub fn new(
        shop_domain: &str,
        access_token: String,
        storefront_token: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            storefront_endpoint: format!(
                "https://{}/api/{}/graphql.json",
                shop_domain, STOREFRONT_API_VERSION
            ),
            admin_endpoint: format!(
                "https://{}/admin/api/{}/graphql.json",
                shop_domain, ADMIN_API_VERSION
            ),
            access_token,
            storefront_token,
            fresh: Cache::builder()
                .max_capacity(CACHE_MAX_ENTRIES)
                .time_to_live(PRODUCT_CACHE_TTL)
                .build(),
            stale: Cache::builder()
                .max_capacity(CACHE_MAX_ENTRIES)
                .time_to_live(STALE_CACHE_TTL)
                .build(),
        }
    }

    async fn storefront_query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, CatalogError> {
        let token = self.storefront_token.as_deref().ok_or_else(|| {
            CatalogError::Upstream("no storefront token configured".to_string())
        })?;

        let response = self
            .http
            .post(&self.storefront_endpoint)
            .header("X-Shopify-Storefront-Access-Token", token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Upstream(format!(
                "storefront API error {}",
                response.status()
            )));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;

        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CatalogError::Upstream(message));
        }

        body.data
            .ok_or_else(|| CatalogError::Upstream("storefront returned empty data".to_string()))
    }

    async fn fetch_product(&self, product_id: &str) -> Result<ProductDetail, CatalogError> {
        let data: GetProductData = self
            .storefront_query(GET_PRODUCT_QUERY, json!({ "id": product_id }))
            .await?;
        let node = data
            .product
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))?;
        Ok(map_product(node))
    }

    async fn admin_mutation<T: serde::de::DeserializeOwned>(
        &self,
        mutation: &str,
        variables: Value,
    ) -> Result<T, AdminError> {
        let response = self
            .http
            .post(&self.admin_endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&json!({ "query": mutation, "variables": variables }))
            .send()
            .await
            .map_err(|e| AdminError::Api {
                message: format!("admin API request failed: {}", e),
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(AdminError::RateLimited { retry_after });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AdminError::Api {
                message: format!("admin API error {}: {}", status, text),
            });
        }

        let body: GraphQlResponse<T> = response.json().await.map_err(|e| AdminError::Api {
            message: format!("admin API bad response: {}", e),
        })?;

        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AdminError::Api { message });
        }

        body.data.ok_or_else(|| AdminError::Api {
            message: "admin API returned empty data".to_string(),
        })
    }

    async fn admin_create_order(
        &self,
        params: &CreateOrderParams,
    ) -> Result<CreateOrderResult, AdminError> {
        let mut line_item = json!({
            "quantity": params.quantity,
            "price": params.price_usdc,
        });
        match &params.variant_id {
            Some(variant_id) => line_item["variantId"] = json!(variant_id),
            None => line_item["title"] = json!(params.product_title),
        }

        let order = json!({
            "lineItems": [line_item],
            "financialStatus": "PAID",
            "currency": "USD",
            "transactions": [{
                "gateway": "agentpay",
                "kind": "SALE",
                "status": "SUCCESS",
                "authorizationCode": params.payment_reference,
                "amountSet": {
                    "shopMoney": {
                        "amount": params.total_usdc,
                        "currencyCode": "USD",
                    },
                },
            }],
            "sourceName": "agentpay",
            "tags": ["agentpay"],
        });

        let data: OrderCreateData = self
            .admin_mutation(ORDER_CREATE_MUTATION, json!({ "order": order }))
            .await?;

        if !data.order_create.user_errors.is_empty() {
            let message = data
                .order_create
                .user_errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AdminError::Api {
                message: format!("orderCreate failed: {}", message),
            });
        }

        let order = data.order_create.order.ok_or_else(|| AdminError::Api {
            message: "orderCreate returned null order".to_string(),
        })?;

        Ok(CreateOrderResult {
            merchant_order_id: order.id,
            order_number: order.name,
        })
    }
}

#[async_trait]
impl ProductCatalog for ShopifyService {
    async fn get_product(&self, product_id: &str) -> Result<ProductDetail, CatalogError> {
        let key = format!("product:{}", product_id);

        if let Some(hit) = self.fresh.get(&key).await {
            return Ok(hit);
        }

        match self.fetch_product(product_id).await {
            Ok(detail) => {
                self.fresh.insert(key.clone(), detail.clone()).await;
                self.stale.insert(key, detail.clone()).await;
                Ok(detail)
            }
            // not-found is an authoritative answer, never papered over
            Err(CatalogError::ProductNotFound(id)) => Err(CatalogError::ProductNotFound(id)),
            Err(err) => match self.stale.get(&key).await {
                Some(stale) => {
                    warn!(product_id = %product_id, error = %err, "serving stale product data");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }
}

#[async_trait]
impl OrderAdapter for ShopifyService {
    async fn create_order(
        &self,
        params: CreateOrderParams,
    ) -> Result<CreateOrderResult, OrderError> {
        match self.admin_create_order(&params).await {
            Ok(result) => Ok(result),
            Err(AdminError::RateLimited { retry_after }) => {
                info!(
                    delay_ms = retry_after.as_millis() as u64,
                    "order API rate limited, retrying once"
                );
                tokio::time::sleep(retry_after).await;
                self.admin_create_order(&params).await.map_err(|err| OrderError {
                    message: format!("order creation failed after rate-limit retry: {}", err),
                    payment_reference: params.payment_reference.clone(),
                })
            }
            Err(err) => Err(OrderError {
                message: format!("order creation failed: {}", err),
                payment_reference: params.payment_reference.clone(),
            }),
        }
    }
}
