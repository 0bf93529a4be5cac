use crm_auth::{ApiRequest, ApiResponse, CrmClient, HttpClient};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::errors::{CustomerError, Result};
use crate::models::{
    CreateCustomerRequest, Customer, CustomerStatistics, CustomerStatus, Page, PageRequest,
    UpdateCustomerRequest,
};

const CUSTOMERS: &str = "/customers";

/// Characters left as-is inside a single path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@')
    .remove(b'+');

/// Typed client for the customer service.
///
/// Requests go through the shared auth pipeline, so an expired access
/// token is refreshed transparently.
#[derive(Debug, Clone)]
pub struct CustomerClient {
    http: HttpClient,
}

impl CustomerClient {
    /// `http` must be bound to the customer service base URL
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn from_crm(client: &CrmClient) -> Self {
        Self::new(client.api_http().clone())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, page: &PageRequest) -> Result<Page<Customer>> {
        let request = ApiRequest::get(CUSTOMERS)
            .query("page", page.page)
            .query("size", page.size)
            .query("sortBy", &page.sort_by)
            .query("sortDir", page.sort_dir);

        let customers: Page<Customer> = self.http.send_json(request).await?;
        debug!(
            "Fetched {} of {} customers",
            customers.content.len(),
            customers.total_elements
        );
        Ok(customers)
    }

    #[instrument(skip(self))]
    pub async fn search(&self, term: &str, page: u32, size: u32) -> Result<Page<Customer>> {
        let request = ApiRequest::get(format!("{CUSTOMERS}/search"))
            .query("searchTerm", term)
            .query("page", page)
            .query("size", size);

        Ok(self.http.send_json(request).await?)
    }

    /// `None` when no customer has this id
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<Customer>> {
        self.find(ApiRequest::get(format!("{CUSTOMERS}/{id}"))).await
    }

    /// `None` when no customer has this email address
    #[instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let email = utf8_percent_encode(email, SEGMENT);
        self.find(ApiRequest::get(format!("{CUSTOMERS}/email/{email}")))
            .await
    }

    #[instrument(skip(self, customer), fields(email = %customer.email))]
    pub async fn create(&self, customer: &CreateCustomerRequest) -> Result<Customer> {
        let request = ApiRequest::post(CUSTOMERS).json(customer)?;
        let created: Customer = self.http.send_json(request).await?;
        info!("Created customer {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self, customer))]
    pub async fn update(&self, id: i64, customer: &UpdateCustomerRequest) -> Result<Customer> {
        let request = ApiRequest::put(format!("{CUSTOMERS}/{id}")).json(customer)?;
        let response = self.http.execute(request).await?;
        decode(found(id, response)?)
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: i64, status: CustomerStatus) -> Result<Customer> {
        let request = ApiRequest::patch(format!("{CUSTOMERS}/{id}/status")).query("status", status);
        let response = self.http.execute(request).await?;
        let updated: Customer = decode(found(id, response)?)?;
        info!("Customer {} is now {}", id, status);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let response = self
            .http
            .execute(ApiRequest::delete(format!("{CUSTOMERS}/{id}")))
            .await?;
        found(id, response)?;
        info!("Deleted customer {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn statistics(&self) -> Result<CustomerStatistics> {
        Ok(self
            .http
            .send_json(ApiRequest::get(format!("{CUSTOMERS}/statistics")))
            .await?)
    }

    async fn find(&self, request: ApiRequest) -> Result<Option<Customer>> {
        let response = self.http.execute(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).map(Some)
    }
}

/// Map a 404 on an addressed customer to `NotFound`, other failures generically
fn found(id: i64, response: ApiResponse) -> Result<ApiResponse> {
    match response.status() {
        StatusCode::NOT_FOUND => Err(CustomerError::NotFound { id }),
        status if status.is_success() => Ok(response),
        _ => Err(response.into_error().into()),
    }
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T> {
    if !response.is_success() {
        return Err(response.into_error().into());
    }
    Ok(response.json()?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crm_auth::{CrmConfig, MemoryTokenStore, NoopNavigator, TokenSlot, TokenStore};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{CustomerSource, SortDirection};

    async fn client(server: &MockServer) -> CustomerClient {
        let url = Url::parse(&format!("{}/api/v1", server.uri())).unwrap();
        let config = CrmConfig::hosted(Url::parse(&server.uri()).unwrap(), url);
        let store = MemoryTokenStore::new();
        store.set(TokenSlot::AccessToken, "T1").await.unwrap();

        let crm = CrmClient::new(config, Arc::new(store), Arc::new(NoopNavigator)).unwrap();
        CustomerClient::from_crm(&crm)
    }

    fn grace() -> serde_json::Value {
        json!({
            "id": 7,
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
            "status": "ACTIVE",
            "source": "REFERRAL"
        })
    }

    #[tokio::test]
    async fn test_list_sends_paging_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers"))
            .and(header("authorization", "Bearer T1"))
            .and(query_param("page", "1"))
            .and(query_param("size", "5"))
            .and(query_param("sortBy", "lastName"))
            .and(query_param("sortDir", "ASC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [grace()],
                "totalElements": 6,
                "totalPages": 2,
                "number": 1,
                "size": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .await
            .list(&PageRequest {
                page: 1,
                size: 5,
                sort_by: "lastName".to_string(),
                sort_dir: SortDirection::Asc,
            })
            .await
            .unwrap();

        assert_eq!(page.total_elements, 6);
        assert_eq!(page.content[0].email, "grace@example.com");
    }

    #[tokio::test]
    async fn test_search_accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/search"))
            .and(query_param("searchTerm", "hopper"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([grace()])))
            .mount(&server)
            .await;

        let page = client(&server).await.search("hopper", 0, 20).await.unwrap();
        assert_eq!(page.content.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grace()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/8"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/email/nobody@example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.get(7).await.unwrap().map(|c| c.id), Some(7));
        assert!(client.get(8).await.unwrap().is_none());
        assert!(client
            .get_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_by_email_escapes_path_separators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/email/ops%2Fteam@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grace()))
            .expect(1)
            .mount(&server)
            .await;

        let found = client(&server)
            .await
            .get_by_email("ops/team@example.com")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(7));
    }

    #[tokio::test]
    async fn test_create_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/customers"))
            .and(body_json(json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "grace@example.com",
                "source": "REFERRAL"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(grace()))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .await
            .create(&CreateCustomerRequest {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                email: "grace@example.com".to_string(),
                source: Some(CustomerSource::Referral),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.id, 7);
    }

    #[tokio::test]
    async fn test_conflicting_email_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/customers"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "Customer with email already exists"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .create(&CreateCustomerRequest {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                email: "grace@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Customer with email already exists");
    }

    #[tokio::test]
    async fn test_status_update_and_delete_map_not_found() {
        let server = MockServer::start().await;
        let mut lead = grace();
        lead["status"] = json!("LEAD");
        Mock::given(method("PATCH"))
            .and(path("/api/v1/customers/7/status"))
            .and(query_param("status", "LEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lead))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/customers/7"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/customers/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/customers/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;

        let updated = client.update_status(7, CustomerStatus::Lead).await.unwrap();
        assert_eq!(updated.status, Some(CustomerStatus::Lead));

        client.delete(7).await.unwrap();
        assert!(matches!(
            client.delete(9).await,
            Err(CustomerError::NotFound { id: 9 })
        ));

        let request = UpdateCustomerRequest {
            first_name: "Nobody".to_string(),
            last_name: "Here".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client.update(9, &request).await,
            Err(CustomerError::NotFound { id: 9 })
        ));
    }

    #[tokio::test]
    async fn test_statistics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/customers/statistics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalCustomers": 10,
                "activeCustomers": 6,
                "vipCustomers": 1,
                "customersByReferral": 3
            })))
            .mount(&server)
            .await;

        let stats = client(&server).await.statistics().await.unwrap();
        assert_eq!(stats.total_customers, 10);
        assert_eq!(stats.customers_by_referral, 3);
        assert_eq!(stats.lead_customers, 0);
    }
}
