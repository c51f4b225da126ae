use crate::api_client::{ApiClient, ApiError};
use crate::bot::dialogue::{FilterContext, ProxyType};
use crate::models::api::{
    Catalog, CatalogsResponse, PptpBulkValidation, PptpPurchase, ProductPage, Socks5Purchase,
    StateCount, ValidationResult, ExtensionResult,
};
use crate::session::TokenPair;

pub const PAGE_SIZE: u32 = 5;

#[derive(Clone)]
pub struct ProductService {
    api: ApiClient,
}

impl ProductService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn filter_query(filter: &FilterContext, page: u32) -> String {
        let mut query = format!("page={}&page_size={}", page.max(1), PAGE_SIZE);
        if let Some(country) = &filter.country {
            query.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        if let Some(catalog_id) = filter.catalog_id {
            query.push_str(&format!("&catalog_id={}", catalog_id));
        }
        if let Some(state) = &filter.state {
            query.push_str(&format!("&state={}", urlencoding::encode(state)));
        }
        if let Some(city) = &filter.city {
            query.push_str(&format!("&city={}", urlencoding::encode(city)));
        }
        if let Some(zip) = &filter.zip_code {
            query.push_str(&format!("&zip_code={}", urlencoding::encode(zip)));
        }
        query
    }

    pub async fn list(
        &self,
        tokens: &mut TokenPair,
        proxy_type: ProxyType,
        filter: &FilterContext,
        page: u32,
    ) -> Result<ProductPage, ApiError> {
        let path = format!(
            "/api/products/{}?{}",
            proxy_type.as_str(),
            Self::filter_query(filter, page)
        );
        self.api.get_authed(&path, tokens).await
    }

    pub async fn catalogs(
        &self,
        tokens: &mut TokenPair,
        proxy_type: ProxyType,
    ) -> Result<Vec<Catalog>, ApiError> {
        let path = format!("/api/products/catalogs?proxy_type={}", proxy_type.as_str());
        let resp: CatalogsResponse = self.api.get_authed(&path, tokens).await?;
        Ok(resp.catalogs)
    }

    pub async fn states(
        &self,
        tokens: &mut TokenPair,
        country: &str,
        proxy_type: ProxyType,
        catalog_id: Option<i64>,
    ) -> Result<Vec<StateCount>, ApiError> {
        let mut path = format!(
            "/api/products/states/{}?proxy_type={}",
            urlencoding::encode(country),
            proxy_type.as_str()
        );
        if let Some(catalog_id) = catalog_id {
            path.push_str(&format!("&catalog_id={}", catalog_id));
        }
        self.api.get_authed(&path, tokens).await
    }

    pub async fn purchase_socks5(
        &self,
        tokens: &mut TokenPair,
        product_id: i64,
    ) -> Result<Socks5Purchase, ApiError> {
        #[derive(serde::Serialize)]
        struct BuyReq {
            product_id: i64,
        }
        self.api
            .post_authed("/api/purchase/socks5", &BuyReq { product_id }, tokens)
            .await
    }

    pub async fn purchase_pptp_product(
        &self,
        tokens: &mut TokenPair,
        product_id: i64,
    ) -> Result<PptpPurchase, ApiError> {
        #[derive(serde::Serialize)]
        struct BuyReq {
            product_id: i64,
        }
        self.api
            .post_authed("/api/purchase/pptp", &BuyReq { product_id }, tokens)
            .await
    }

    /// PPTP purchase by filter bundle instead of a concrete product id.
    pub async fn purchase_pptp_by_filter(
        &self,
        tokens: &mut TokenPair,
        filter: &FilterContext,
    ) -> Result<PptpPurchase, ApiError> {
        #[derive(serde::Serialize)]
        struct BuyReq<'a> {
            country: Option<&'a str>,
            catalog_id: Option<i64>,
            state: Option<&'a str>,
            city: Option<&'a str>,
            zip_code: Option<&'a str>,
        }
        let req = BuyReq {
            country: filter.country.as_deref(),
            catalog_id: filter.catalog_id,
            state: filter.state.as_deref(),
            city: filter.city.as_deref(),
            zip_code: filter.zip_code.as_deref(),
        };
        self.api.post_authed("/api/purchase/pptp", &req, tokens).await
    }

    pub async fn validate(
        &self,
        tokens: &mut TokenPair,
        proxy_id: i64,
        proxy_type: ProxyType,
    ) -> Result<ValidationResult, ApiError> {
        let path = format!(
            "/api/purchase/validate/{}?proxy_type={}",
            proxy_id,
            proxy_type.as_str()
        );
        self.api.post_authed(&path, &(), tokens).await
    }

    pub async fn extend(
        &self,
        tokens: &mut TokenPair,
        proxy_id: i64,
        proxy_type: ProxyType,
    ) -> Result<ExtensionResult, ApiError> {
        let path = format!(
            "/api/purchase/extend/{}?proxy_type={}",
            proxy_id,
            proxy_type.as_str()
        );
        self.api.post_authed(&path, &(), tokens).await
    }

    pub async fn validate_all_pptp(
        &self,
        tokens: &mut TokenPair,
    ) -> Result<PptpBulkValidation, ApiError> {
        self.api
            .post_authed("/api/purchase/validate-pptp", &(), tokens)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_query_includes_only_set_fields() {
        let mut filter = FilterContext::default();
        filter.country = Some("US".into());
        let q = ProductService::filter_query(&filter, 1);
        assert_eq!(q, "page=1&page_size=5&country=US");

        filter.state = Some("New York".into());
        filter.zip_code = Some("10001".into());
        let q = ProductService::filter_query(&filter, 3);
        assert!(q.starts_with("page=3&page_size=5"));
        assert!(q.contains("&country=US"));
        assert!(q.contains("&state=New%20York"));
        assert!(q.contains("&zip_code=10001"));
        assert!(!q.contains("city="));
    }

    #[test]
    fn filter_query_clamps_page_to_one() {
        let q = ProductService::filter_query(&FilterContext::default(), 0);
        assert!(q.starts_with("page=1&"));
    }
}
