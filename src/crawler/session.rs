//! Site login flows
//!
//! Authentication gets exactly one attempt per site, before any page is
//! fetched. A rejected or failed login fails that site alone and is never
//! retried, so bad credentials cannot hammer a login endpoint. Session
//! state lives inside the fetch backend (cookie jar or browser profile);
//! the handle returned here only proves the flow completed.

use crate::config::{CrawlTarget, LoginConfig};
use crate::crawler::governor::{Governor, RequestOutcome};
use crate::fetch::{Fetcher, LoginForm, SessionHandle};
use crate::{AuthError, FetchError};
use tracing::{info, warn};
use url::Url;

/// Runs a target's login flow, if it requires one
///
/// Returns `Ok(None)` for sites with no login requirement. Success is any
/// response below HTTP 400, so a redirect after login counts.
pub async fn authenticate(
    target: &CrawlTarget,
    fetcher: &dyn Fetcher,
    governor: &Governor,
) -> Result<Option<SessionHandle>, AuthError> {
    let login = match target.required_login() {
        Some(login) => login,
        None => return Ok(None),
    };

    if login.username.is_empty() || login.password.is_empty() {
        return Err(AuthError::MissingCredentials {
            site: target.name.clone(),
        });
    }

    // The URL was validated at load time; re-parse to carry it as a Url
    let url = Url::parse(&login.login_url).map_err(|e| AuthError::Network {
        site: target.name.clone(),
        message: format!("invalid login URL: {}", e),
    })?;

    let form = login_form(login);

    let endpoint = governor.acquire().await;
    let result = fetcher.submit_form(&url, &form, endpoint.as_ref()).await;
    let outcome = match &result {
        Ok(_) => RequestOutcome::Succeeded,
        Err(_) => RequestOutcome::Failed,
    };
    governor.release(endpoint.as_ref(), outcome).await;

    let page = result.map_err(|e| classify(&target.name, e))?;

    if page.status < 400 {
        info!(site = %target.name, status = page.status, "login accepted");
        Ok(Some(SessionHandle::new(&target.name)))
    } else {
        warn!(site = %target.name, status = page.status, "login rejected");
        Err(AuthError::Rejected {
            site: target.name.clone(),
            status: page.status,
        })
    }
}

fn login_form(login: &LoginConfig) -> LoginForm {
    LoginForm {
        fields: vec![
            (login.username_field.clone(), login.username.clone()),
            (login.password_field.clone(), login.password.clone()),
        ],
        submit_selector: login.submit_selector.clone(),
    }
}

/// Maps a transport failure during login onto the auth taxonomy
fn classify(site: &str, error: FetchError) -> AuthError {
    match error {
        FetchError::Timeout { .. } => AuthError::Timeout {
            site: site.to_string(),
        },
        FetchError::Http { status, .. } => AuthError::Rejected {
            site: site.to_string(),
            status,
        },
        other => AuthError::Network {
            site: site.to_string(),
            message: other.to_string(),
        },
    }
}
