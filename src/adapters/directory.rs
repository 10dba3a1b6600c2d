use crate::config::DirectoryConfig;
use crate::domain::ports::IdentityClient;
use crate::utils::error::DirectoryError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SCIM_PATCH_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";
const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
struct GroupSearchResponse {
    #[serde(rename = "Resources", default)]
    resources: Vec<ScimResource>,
}

#[derive(Debug, Deserialize)]
struct ScimResource {
    id: String,
}

/// Client for the SCIM 2.0 directory hosted on each pooled VM.
///
/// All calls authenticate with the directory admin credentials from
/// [`DirectoryConfig`], never with the tenant's own account.
pub struct ScimDirectoryClient {
    client: Client,
    config: DirectoryConfig,
}

impl ScimDirectoryClient {
    pub fn new(config: DirectoryConfig) -> reqwest::Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn groups_url(&self, ip: &str) -> String {
        format!("{}://{}{}", self.config.scheme, ip, self.config.groups_path)
    }

    pub fn users_url(&self, ip: &str) -> String {
        format!("{}://{}{}", self.config.scheme, ip, self.config.users_path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.admin_username, Some(&self.config.admin_password))
            .header(ACCEPT, APPLICATION_JSON)
    }
}

#[async_trait]
impl IdentityClient for ScimDirectoryClient {
    async fn lookup_admin_group(&self, ip: &str) -> Result<String, DirectoryError> {
        let url = self.groups_url(ip);
        let filter = format!("displayName eq {}", self.config.admin_group);

        // Errors report the query exactly as sent.
        let request = self
            .request(Method::GET, &url)
            .query(&[("filter", filter.as_str())])
            .build()
            .map_err(|e| DirectoryError::GroupLookupFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let sent_url = request.url().to_string();
        let fail = |reason: String| DirectoryError::GroupLookupFailed {
            url: sent_url.clone(),
            reason,
        };

        tracing::debug!("Looking up admin group '{}' at {}", self.config.admin_group, sent_url);

        let response = self
            .client
            .execute(request)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;

        let body: GroupSearchResponse = response.json().await.map_err(|e| fail(e.to_string()))?;

        let group = body
            .resources
            .into_iter()
            .next()
            .ok_or_else(|| fail("no group matched the filter".to_string()))?;

        tracing::debug!("Resolved admin group id {}", group.id);
        Ok(group.id)
    }

    async fn create_user(&self, ip: &str, password: &str) -> Result<String, DirectoryError> {
        let url = self.users_url(ip);
        let fail = |reason: String| DirectoryError::UserCreateFailed {
            url: url.clone(),
            reason,
        };

        let payload = json!({
            "userName": self.config.service_admin,
            "password": password,
        });

        let response = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;

        let user: ScimResource = response.json().await.map_err(|e| fail(e.to_string()))?;

        tracing::info!("Created service admin :: user id :: {}", user.id);
        Ok(user.id)
    }

    async fn grant_group_membership(
        &self,
        ip: &str,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/{}", self.groups_url(ip), group_id);

        let payload = json!({
            "schemas": [SCIM_PATCH_SCHEMA],
            "Operations": [{
                "op": "add",
                "value": {
                    "members": [{
                        "display": self.config.service_admin,
                        "value": user_id,
                    }]
                }
            }]
        });

        let response = self
            .request(Method::PATCH, &url)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DirectoryError::GroupGrantFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Registered admin group :: user id :: {} :: group id :: {} :: status :: {}",
            user_id,
            group_id,
            response.status()
        );
        Ok(())
    }

    async fn delete_user(&self, ip: &str, user_id: &str) -> Result<(), DirectoryError> {
        let url = format!("{}/{}", self.users_url(ip), user_id);

        let response = self
            .request(Method::DELETE, &url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DirectoryError::UserDeleteFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Deleted user :: user id :: {} :: status :: {}",
            user_id,
            response.status()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    // base64("admin:secret")
    const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

    fn client_for(server: &MockServer) -> ScimDirectoryClient {
        let config = DirectoryConfig {
            scheme: "http".to_string(),
            groups_path: format!(":{}/scim2/Groups", server.port()),
            users_path: format!(":{}/scim2/Users", server.port()),
            admin_username: "admin".to_string(),
            admin_password: "secret".to_string(),
            service_admin: "svcadmin".to_string(),
            ..DirectoryConfig::default()
        };
        ScimDirectoryClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_admin_group_takes_first_result() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/scim2/Groups")
                .query_param("filter", "displayName eq PRIMARY/admin")
                .header("authorization", BASIC_AUTH)
                .header("accept", "application/json");
            then.status(200).json_body(serde_json::json!({
                "totalResults": 2,
                "Resources": [
                    {"id": "g1", "displayName": "PRIMARY/admin"},
                    {"id": "g2", "displayName": "PRIMARY/admin"}
                ]
            }));
        });

        let client = client_for(&server);
        let group_id = client.lookup_admin_group("127.0.0.1").await.unwrap();

        assert_eq!(group_id, "g1");
        mock.assert();
    }

    #[tokio::test]
    async fn test_lookup_admin_group_with_no_results_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/scim2/Groups");
            then.status(200)
                .json_body(serde_json::json!({"totalResults": 0, "Resources": []}));
        });

        let client = client_for(&server);
        let err = client.lookup_admin_group("127.0.0.1").await.unwrap_err();

        assert!(matches!(err, DirectoryError::GroupLookupFailed { .. }));
        assert_eq!(
            err.url(),
            format!(
                "http://127.0.0.1:{}/scim2/Groups?filter=displayName+eq+PRIMARY%2Fadmin",
                server.port()
            )
        );
    }

    #[tokio::test]
    async fn test_create_user_posts_service_admin() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/scim2/Users")
                .header("authorization", BASIC_AUTH)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"userName": "svcadmin", "password": "pw"}));
            then.status(201)
                .json_body(serde_json::json!({"id": "u1", "userName": "svcadmin"}));
        });

        let client = client_for(&server);
        let user_id = client.create_user("127.0.0.1", "pw").await.unwrap();

        assert_eq!(user_id, "u1");
        mock.assert();
    }

    #[tokio::test]
    async fn test_create_user_error_status_carries_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/scim2/Users");
            then.status(409).body("conflict");
        });

        let client = client_for(&server);
        let err = client.create_user("127.0.0.1", "pw").await.unwrap_err();

        match err {
            DirectoryError::UserCreateFailed { url, reason } => {
                assert_eq!(url, format!("http://127.0.0.1:{}/scim2/Users", server.port()));
                assert!(reason.contains("409"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grant_group_membership_sends_patch_op() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/scim2/Groups/g1")
                .header("authorization", BASIC_AUTH)
                .json_body(serde_json::json!({
                    "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
                    "Operations": [{
                        "op": "add",
                        "value": {"members": [{"display": "svcadmin", "value": "u1"}]}
                    }]
                }));
            then.status(200);
        });

        let client = client_for(&server);
        client
            .grant_group_membership("127.0.0.1", "g1", "u1")
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_delete_user_failure_is_reported() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/scim2/Users/u1")
                .header("authorization", BASIC_AUTH);
            then.status(500);
        });

        let client = client_for(&server);
        let err = client.delete_user("127.0.0.1", "u1").await.unwrap_err();

        assert!(matches!(err, DirectoryError::UserDeleteFailed { .. }));
        mock.assert();
    }
}
