//! Authenticated session against the DSM 7 web API (`entry.cgi`).
//!
//! DSM 7 wants `SYNO.API.Auth` version 7 with `enable_syno_token=yes`, and the
//! returned SynoToken on every later request, reads and writes alike.

use crate::error::{ApiFailure, CertPushError, Result};
use crate::multipart::MultipartForm;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session name registered with DSM at login and logout.
pub const SESSION_NAME: &str = "cert-push";

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const AUTH_API: &str = "SYNO.API.Auth";
const AUTH_VERSION: &str = "7";

// ---------------------------------------------------------------------------
// RemoteEndpoint
// ---------------------------------------------------------------------------

/// Base URL of the DSM web API, e.g. `https://nas.lan:5001/webapi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    base_url: String,
}

impl RemoteEndpoint {
    pub fn https(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("https://{host}:{port}/webapi"),
        }
    }

    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entry_url(&self) -> String {
        format!("{}/entry.cgi", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Credentials minted by a successful login. Lives for one run only.
pub struct Session {
    sid: String,
    token: Option<String>,
}

impl Session {
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// SynoToken; older DSM builds do not return one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `params` followed by `_sid` and, when present, `SynoToken`.
    fn authenticated_query<'a>(
        &'a self,
        params: &[(&'a str, &'a str)],
    ) -> Vec<(&'a str, &'a str)> {
        let mut query = params.to_vec();
        query.push(("_sid", self.sid.as_str()));
        if let Some(token) = self.token() {
            query.push(("SynoToken", token));
        }
        query
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sid", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    sid: String,
    #[serde(default)]
    synotoken: Option<String>,
}

/// Every DSM response: `{"success": bool, "data": ..., "error": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: serde_json::Value,
}

impl Envelope {
    fn into_data<T: DeserializeOwned>(
        self,
        on_failure: fn(ApiFailure) -> CertPushError,
    ) -> Result<T> {
        if !self.success {
            return Err(on_failure(ApiFailure::from_payload(self.error)));
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

// ---------------------------------------------------------------------------
// SessionClient
// ---------------------------------------------------------------------------

pub struct SessionClient {
    http: Client,
    endpoint: RemoteEndpoint,
}

impl SessionClient {
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self> {
        // Accepted risk: the NAS sits on a trusted LAN and serves its
        // management API with a self-signed certificate, so chain and
        // hostname verification are off for this client only. Do not reuse
        // this client for anything reachable beyond that LAN.
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Authenticate and return a guard that logs out when dropped.
    pub fn login(&self, username: &str, password: &str) -> Result<SessionGuard<'_>> {
        info!("Authenticating to DSM as '{username}'");
        let query = [
            ("api", AUTH_API),
            ("version", AUTH_VERSION),
            ("method", "login"),
            ("account", username),
            ("passwd", password),
            ("session", SESSION_NAME),
            ("format", "sid"),
            ("enable_syno_token", "yes"),
        ];
        debug!("GET {} api={AUTH_API} method=login", self.endpoint.entry_url());
        let request = self
            .http
            .get(self.endpoint.entry_url())
            .query(&query)
            .timeout(READ_TIMEOUT);
        let data: LoginData = send(request)?.into_data(CertPushError::Authentication)?;

        let session = Session {
            sid: data.sid,
            token: data.synotoken.filter(|t| !t.is_empty()),
        };
        info!("DSM authentication successful");
        debug!("SynoToken present: {}", session.token.is_some());
        Ok(SessionGuard {
            client: self,
            session,
        })
    }

    /// Authenticated read. `_sid` and `SynoToken` are appended to `params`.
    pub fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let query = session.authenticated_query(params);
        debug!("GET {} {}", self.endpoint.entry_url(), describe(params));
        let request = self
            .http
            .get(self.endpoint.entry_url())
            .query(&query)
            .timeout(READ_TIMEOUT);
        send(request)?.into_data(CertPushError::RemoteApi)
    }

    /// Authenticated multipart POST. The session credentials go into the URL
    /// query; the token is repeated in the `X-SYNO-TOKEN` header.
    pub fn upload_multipart<T: DeserializeOwned>(
        &self,
        session: &Session,
        params: &[(&str, &str)],
        form: &MultipartForm,
    ) -> Result<T> {
        let query = session.authenticated_query(params);
        let encoded = form.encode();
        debug!(
            "POST {} {} (multipart, {} bytes)",
            self.endpoint.entry_url(),
            describe(params),
            encoded.body.len()
        );
        let mut request = self
            .http
            .post(self.endpoint.entry_url())
            .query(&query)
            .header(CONTENT_TYPE, encoded.content_type)
            .body(encoded.body)
            .timeout(UPLOAD_TIMEOUT);
        if let Some(token) = session.token() {
            request = request.header("X-SYNO-TOKEN", token);
        }
        send(request)?.into_data(CertPushError::RemoteApi)
    }

    /// Terminate `session`. Failures are logged and swallowed.
    pub fn logout(&self, session: &Session) {
        let params = [
            ("api", AUTH_API),
            ("version", AUTH_VERSION),
            ("method", "logout"),
            ("session", SESSION_NAME),
        ];
        match self.get::<serde_json::Value>(session, &params) {
            Ok(_) => info!("DSM session closed"),
            Err(e) => warn!("Logout failed (non-fatal): {e}"),
        }
    }
}

/// Transport errors drop their URL: the query carries the password on login
/// and the session credentials on every other call.
fn send(request: RequestBuilder) -> Result<Envelope> {
    let response = request
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(reqwest::Error::without_url)?;
    Ok(response.json().map_err(reqwest::Error::without_url)?)
}

/// `api=… method=…` for log lines; other parameters may carry secrets.
fn describe(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .filter(|(k, _)| matches!(*k, "api" | "method"))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// An open session. Logs out exactly once when dropped, whichever way the
/// caller leaves the scope.
pub struct SessionGuard<'c> {
    client: &'c SessionClient,
    session: Session,
}

impl<'c> SessionGuard<'c> {
    pub fn client(&self) -> &'c SessionClient {
        self.client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// End the session now instead of at scope exit.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.client.logout(&self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn client(server: &ServerGuard) -> SessionClient {
        SessionClient::new(RemoteEndpoint::from_base_url(format!("{}/webapi/", server.url()))).unwrap()
    }

    fn query(pairs: &[(&str, &str)]) -> Matcher {
        Matcher::AllOf(
            pairs
                .iter()
                .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn mock_login(server: &mut ServerGuard, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[
                ("api", "SYNO.API.Auth"),
                ("version", "7"),
                ("method", "login"),
                ("account", "admin"),
                ("passwd", "s3cret"),
                ("session", "cert-push"),
                ("format", "sid"),
                ("enable_syno_token", "yes"),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create()
    }

    fn mock_logout(server: &mut ServerGuard, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[("method", "logout"), ("_sid", "sid-1")]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(1)
            .create()
    }

    #[test]
    fn endpoint_from_host_and_port() {
        let endpoint = RemoteEndpoint::https("nas.lan", 5001);
        assert_eq!(endpoint.base_url(), "https://nas.lan:5001/webapi");
        assert_eq!(endpoint.entry_url(), "https://nas.lan:5001/webapi/entry.cgi");
    }

    #[test]
    fn login_stores_sid_and_token() {
        let mut server = Server::new();
        let login = mock_login(
            &mut server,
            r#"{"success":true,"data":{"sid":"sid-1","synotoken":"tok-1"}}"#,
        );
        let logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        let guard = client.login("admin", "s3cret").unwrap();
        assert_eq!(guard.session().sid(), "sid-1");
        assert_eq!(guard.session().token(), Some("tok-1"));
        guard.close();

        login.assert();
        logout.assert();
    }

    #[test]
    fn login_without_token_is_accepted() {
        let mut server = Server::new();
        let _login = mock_login(&mut server, r#"{"success":true,"data":{"sid":"sid-1"}}"#);
        let logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        {
            let guard = client.login("admin", "s3cret").unwrap();
            assert_eq!(guard.session().token(), None);
        }
        logout.assert();
    }

    #[test]
    fn login_failure_is_authentication_error() {
        let mut server = Server::new();
        let _login = mock_login(&mut server, r#"{"success":false,"error":{"code":400}}"#);
        let logout = server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[("method", "logout")]))
            .expect(0)
            .create();

        let client = client(&server);
        let err = client.login("admin", "s3cret").err().unwrap();
        match err {
            CertPushError::Authentication(failure) => assert_eq!(failure.code, Some(400)),
            other => panic!("expected authentication error, got {other:?}"),
        }
        logout.assert();
    }

    #[test]
    fn get_carries_session_credentials() {
        let mut server = Server::new();
        let _login = mock_login(
            &mut server,
            r#"{"success":true,"data":{"sid":"sid-1","synotoken":"tok-1"}}"#,
        );
        let read = server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[
                ("api", "SYNO.Core.Certificate.CRT"),
                ("method", "list"),
                ("_sid", "sid-1"),
                ("SynoToken", "tok-1"),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"answer":42}}"#)
            .expect(1)
            .create();
        let _logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        let guard = client.login("admin", "s3cret").unwrap();
        let data: serde_json::Value = client
            .get(
                guard.session(),
                &[("api", "SYNO.Core.Certificate.CRT"), ("method", "list")],
            )
            .unwrap();
        assert_eq!(data["answer"], 42);
        read.assert();
    }

    #[test]
    fn get_failure_is_remote_api_error() {
        let mut server = Server::new();
        let _login = mock_login(&mut server, r#"{"success":true,"data":{"sid":"sid-1"}}"#);
        let _list = server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[("method", "list")]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":{"code":105}}"#)
            .create();
        let _logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        let guard = client.login("admin", "s3cret").unwrap();
        let err = client
            .get::<serde_json::Value>(guard.session(), &[("method", "list")])
            .unwrap_err();
        assert_eq!(err.kind(), "remote_api");
        assert!(err.to_string().contains("105"));
    }

    #[test]
    fn upload_sends_multipart_with_token() {
        let mut server = Server::new();
        let _login = mock_login(
            &mut server,
            r#"{"success":true,"data":{"sid":"sid-1","synotoken":"tok-1"}}"#,
        );
        let upload = server
            .mock("POST", "/webapi/entry.cgi")
            .match_query(query(&[
                ("api", "SYNO.Core.Certificate"),
                ("method", "import"),
                ("_sid", "sid-1"),
                ("SynoToken", "tok-1"),
            ]))
            .match_header("x-syno-token", "tok-1")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=[0-9a-f]{32}$".into()),
            )
            .match_body(Matcher::Regex(r#"name="id"\r\n\r\ncrt-9\r\n"#.into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{}}"#)
            .expect(1)
            .create();
        let _logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        let guard = client.login("admin", "s3cret").unwrap();
        let form = MultipartForm::new().text("id", "crt-9");
        let _: serde_json::Value = client
            .upload_multipart(
                guard.session(),
                &[("api", "SYNO.Core.Certificate"), ("method", "import")],
                &form,
            )
            .unwrap();
        upload.assert();
    }

    /// A loopback port nothing listens on.
    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn unreachable_login_error_hides_password() {
        let endpoint = RemoteEndpoint::from_base_url(format!("http://127.0.0.1:{}/webapi", closed_port()));
        let client = SessionClient::new(endpoint).unwrap();
        let err = client.login("admin", "TOPSECRETPW").err().unwrap();
        assert_eq!(err.kind(), "unexpected");
        let msg = format!("{err} {err:?}");
        assert!(!msg.contains("TOPSECRETPW"), "{msg}");
        assert!(!msg.contains("passwd"), "{msg}");
    }

    #[test]
    fn http_status_error_hides_session_credentials() {
        let mut server = Server::new();
        let _login = mock_login(
            &mut server,
            r#"{"success":true,"data":{"sid":"sid-1","synotoken":"tok-1"}}"#,
        );
        let _list = server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[("method", "list")]))
            .with_status(502)
            .create();
        let _logout = mock_logout(&mut server, r#"{"success":true}"#);

        let client = client(&server);
        let guard = client.login("admin", "s3cret").unwrap();
        let err = client
            .get::<serde_json::Value>(guard.session(), &[("method", "list")])
            .unwrap_err();
        let msg = format!("{err} {err:?}");
        assert!(msg.contains("502"), "{msg}");
        assert!(!msg.contains("sid-1"), "{msg}");
        assert!(!msg.contains("tok-1"), "{msg}");
    }

    #[test]
    fn logout_failure_is_swallowed() {
        let mut server = Server::new();
        let _login = mock_login(&mut server, r#"{"success":true,"data":{"sid":"sid-1"}}"#);
        let logout = server
            .mock("GET", "/webapi/entry.cgi")
            .match_query(query(&[("method", "logout")]))
            .with_status(500)
            .expect(1)
            .create();

        let client = client(&server);
        client.login("admin", "s3cret").unwrap().close();
        logout.assert();
    }
}
