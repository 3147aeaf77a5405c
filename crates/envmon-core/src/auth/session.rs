//! Calls against the backend's identity endpoints.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{RequestAuth, Transport};
use crate::models::{Credential, Identity};

use super::AuthFailure;

const LOGIN_PATH: &str = "/api/auth/login";
const ME_PATH: &str = "/api/auth/me";
const PASSWORD_PATH: &str = "/api/auth/password";

/// Backend password length limits
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 50;

/// Characters the backend accepts as "special"
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct PasswordChange<'a> {
    new_password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_password: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Check a new password against the backend's password policy.
pub fn check_password_policy(new_password: &str, old_password: Option<&str>) -> Result<(), AuthFailure> {
    let len = new_password.chars().count();
    if len < MIN_PASSWORD_LEN || len > MAX_PASSWORD_LEN {
        return Err(AuthFailure::invalid_input(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    if !new_password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthFailure::invalid_input(
            "Password must contain at least one upper-case letter",
        ));
    }
    if !new_password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthFailure::invalid_input(
            "Password must contain at least one lower-case letter",
        ));
    }
    if !new_password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthFailure::invalid_input("Password must contain at least one digit"));
    }
    if !new_password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(AuthFailure::invalid_input(
            "Password must contain at least one special character",
        ));
    }
    if old_password == Some(new_password) {
        return Err(AuthFailure::invalid_input(
            "New password must differ from the old one",
        ));
    }
    Ok(())
}

/// Stateless wrapper over the identity endpoints. Clone is cheap - it
/// shares the underlying `Transport`.
#[derive(Clone)]
pub struct SessionClient {
    transport: Transport,
}

impl SessionClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Exchange username and password for a new credential.
    ///
    /// Uses the OAuth2 password-grant form the backend expects; the
    /// client-id/secret/scope fields are always sent empty.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, AuthFailure> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthFailure::invalid_input("Username and password required"));
        }

        let form = [
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
            ("scope", ""),
            ("client_id", ""),
            ("client_secret", ""),
        ];

        let response: LoginResponse = self
            .transport
            .post_form(LOGIN_PATH, &form[..], RequestAuth::Anonymous)
            .await
            .map_err(|e| {
                warn!(username, error = %e, "Login failed");
                AuthFailure::from(e)
            })?;

        if let Some(ref kind) = response.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                warn!(token_type = %kind, "Unexpected token type in login response");
            }
        }

        let credential = Credential::new(response.access_token);
        if credential.is_empty() {
            return Err(AuthFailure::new(
                super::AuthFailureReason::ServerError,
                "Login response did not include an access token",
            ));
        }

        info!(username, "Login accepted");
        Ok(credential)
    }

    /// Ask the backend who `credential` belongs to.
    pub async fn validate(&self, credential: &Credential) -> Result<Identity, AuthFailure> {
        let identity: Identity = self
            .transport
            .get_json_as(ME_PATH, RequestAuth::Explicit(credential))
            .await
            .map_err(|e| {
                debug!(error = %e, "Session validation failed");
                AuthFailure::from(e)
            })?;
        debug!(username = %identity.username, role = %identity.role, "Session validated");
        Ok(identity)
    }

    /// Change the password of the account behind the active credential.
    ///
    /// Returns the server's confirmation message when it sends one.
    pub async fn change_password(
        &self,
        new_password: &str,
        old_password: Option<&str>,
    ) -> Result<Option<String>, AuthFailure> {
        check_password_policy(new_password, old_password)?;

        if self.transport.credential().is_none() {
            return Err(AuthFailure::not_authenticated());
        }

        let body = PasswordChange {
            new_password,
            old_password,
        };
        let response: MessageResponse = self
            .transport
            .put_json(PASSWORD_PATH, &body)
            .await
            .map_err(AuthFailure::from)?;

        info!("Password changed");
        Ok(response.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mockito::Matcher;

    use crate::auth::AuthFailureReason;
    use crate::models::Role;

    fn client(url: &str) -> SessionClient {
        SessionClient::new(Transport::new(url, Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password_policy("Str0ng!pass", None).is_ok());
        assert!(check_password_policy("Sh0rt!", None).is_err());
        assert!(check_password_policy(&format!("Aa1!{}", "x".repeat(60)), None).is_err());
        assert!(check_password_policy("nouppercase1!", None).is_err());
        assert!(check_password_policy("NOLOWERCASE1!", None).is_err());
        assert!(check_password_policy("NoDigitsHere!", None).is_err());
        assert!(check_password_policy("NoSpecial123", None).is_err());

        let same = check_password_policy("Str0ng!pass", Some("Str0ng!pass")).unwrap_err();
        assert_eq!(same.reason, AuthFailureReason::InvalidInput);
        assert!(check_password_policy("Str0ng!pass", Some("0ld!Passw0rd")).is_ok());
    }

    #[tokio::test]
    async fn test_login_sends_password_grant_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", LOGIN_PATH)
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "alice".into()),
                Matcher::UrlEncoded("password".into(), "S3cret!pw".into()),
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
                Matcher::UrlEncoded("scope".into(), "".into()),
                Matcher::UrlEncoded("client_id".into(), "".into()),
                Matcher::UrlEncoded("client_secret".into(), "".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "jwt-abc", "token_type": "bearer"}"#)
            .create_async()
            .await;

        let credential = client(&server.url()).login("alice", "S3cret!pw").await.unwrap();
        assert_eq!(credential.as_str(), "jwt-abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", LOGIN_PATH)
            .with_status(401)
            .with_body(r#"{"detail": "Incorrect username or password"}"#)
            .create_async()
            .await;

        let err = client(&server.url()).login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_login_empty_fields_skip_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", LOGIN_PATH).expect(0).create_async().await;

        let c = client(&server.url());
        assert_eq!(
            c.login("", "pw").await.unwrap_err().reason,
            AuthFailureReason::InvalidInput
        );
        assert_eq!(
            c.login("alice", "").await.unwrap_err().reason,
            AuthFailureReason::InvalidInput
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_empty_token_is_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", LOGIN_PATH)
            .with_status(200)
            .with_body(r#"{"access_token": "", "token_type": "bearer"}"#)
            .create_async()
            .await;

        let err = client(&server.url()).login("alice", "pw").await.unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::ServerError);
    }

    #[tokio::test]
    async fn test_login_unreachable_server_is_network_failure() {
        // Nothing listens on the discard port
        let err = client("http://127.0.0.1:9").login("alice", "pw").await.unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::Network);
    }

    #[tokio::test]
    async fn test_validate_uses_given_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ME_PATH)
            .match_header("authorization", "Bearer bob-token")
            .with_status(200)
            .with_body(r#"{"id": 7, "username": "bob", "role": "manager"}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        c.transport().set_credential(Some(Credential::new("someone-else")));
        let identity = c.validate(&Credential::new("bob-token")).await.unwrap();
        assert_eq!(identity.username, "bob");
        assert_eq!(identity.role, Role::Manager);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_role() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ME_PATH)
            .with_status(200)
            .with_body(r#"{"id": 7, "username": "bob", "role": "owner"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .validate(&Credential::new("t"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::ServerError);
    }

    #[tokio::test]
    async fn test_change_password_requires_credential() {
        let server = mockito::Server::new_async().await;
        let err = client(&server.url())
            .change_password("N3w!password", None)
            .await
            .unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_change_password_reports_server_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", PASSWORD_PATH)
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(serde_json::json!({
                "new_password": "N3w!password",
                "old_password": "0ld!password"
            })))
            .with_status(400)
            .with_body(r#"{"detail": "Old password is incorrect"}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        c.transport().set_credential(Some(Credential::new("tok")));
        let err = c
            .change_password("N3w!password", Some("0ld!password"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, AuthFailureReason::InvalidInput);
        assert_eq!(err.message, "Old password is incorrect");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_change_password_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", PASSWORD_PATH)
            .match_body(Matcher::Json(serde_json::json!({"new_password": "N3w!password"})))
            .with_status(200)
            .with_body(r#"{"message": "Password changed"}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        c.transport().set_credential(Some(Credential::new("tok")));
        let message = c.change_password("N3w!password", None).await.unwrap();
        assert_eq!(message.as_deref(), Some("Password changed"));
    }
}
