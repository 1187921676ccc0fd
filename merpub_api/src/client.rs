//! HTTP client for the agile-tender portal.
//!
//! The portal is a server-rendered site behind a cookie session: login is a
//! form POST followed by an organism selection, searches are paginated GETs,
//! and quote details hang off a handful of secondary endpoints (provider
//! export, per-quote modal AJAX calls, buying-order page).

use std::time::Duration;

use url::Url;

use crate::listing::{self, SearchResultsPage};
use crate::query::SearchQuery;
use crate::retry::{with_retry, BackoffPolicy};
use crate::types::{Credentials, Session, TenderSnapshot, VirtualFile};
use crate::user_agent::get_user_agent;
use crate::{html, Error};

const DEFAULT_BASE_URL: &str = "https://compraagil.mercadopublico.cl";

/// Client for the agile-tender portal.
///
/// Holds a single `reqwest::Client` with a cookie jar: the portal session
/// lives in the cookies, and the [`Session`] value handed out by
/// [`login`](MerPubClient::login) serializes their use.
pub struct MerPubClient {
    base_url: Url,
    http: reqwest::Client,
    credentials: Credentials,
    backoff: BackoffPolicy,
}

impl MerPubClient {
    /// Creates a client against the production portal.
    pub fn new(credentials: Credentials) -> Result<Self, Error> {
        Self::with_base_url(DEFAULT_BASE_URL, credentials)
    }

    /// Creates a client with a custom portal root. Used for testing with
    /// wiremock.
    pub fn with_base_url(base_url: &str, credentials: Credentials) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http,
            credentials,
            backoff: BackoffPolicy::default(),
        })
    }

    /// Replaces the retry schedule (tests use tight delays).
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Authenticates and selects the first organism the portal offers.
    ///
    /// Fatal outcomes are surfaced as [`Error::AccountLocked`] and
    /// [`Error::InvalidCredentials`]. A login response without any of the
    /// known markers is retried once before giving up, since the portal
    /// intermittently serves a bare shell page.
    pub async fn login(&self) -> Result<Session, Error> {
        match self.try_login().await {
            Err(Error::Structure { what, .. }) => {
                tracing::debug!("login page not ready ({}), retrying once", what);
                self.try_login().await.map_err(|e| match e {
                    Error::Structure { what, .. } => Error::Auth(what),
                    other => other,
                })
            }
            other => other,
        }
    }

    async fn try_login(&self) -> Result<Session, Error> {
        let url = self.base_url.join("Login/Ingresar")?;
        let form = [
            ("rut", self.credentials.rut.clone()),
            ("password", self.credentials.password.clone()),
        ];
        let body = self.post_form(url, &form).await?;

        if html::has_class(&body, "swal2-container") {
            return Err(Error::AccountLocked);
        }
        if html::element_by_id(&body, "kc-error-message").is_some() {
            return Err(Error::InvalidCredentials);
        }
        let organisms = html::class_attr_values(&body, "rdbOrganismo", "value");
        let Some(organism) = organisms.into_iter().find(|v| !v.is_empty()) else {
            return Err(Error::Structure {
                what: "login response without organism list".into(),
                body,
            });
        };

        let url = self.base_url.join("Login/SeleccionarOrganismo")?;
        self.post_form(url, &[("organismo", organism.clone())])
            .await?;
        tracing::debug!("logged in, organism {}", organism);
        Ok(Session::new(organism))
    }

    /// Fetches one page of search results. Page numbers start at 1.
    ///
    /// An empty result set is a page with zero rows, not an error.
    pub async fn search_page(
        &self,
        session: &mut Session,
        query: &SearchQuery,
        page: u32,
    ) -> Result<SearchResultsPage, Error> {
        let url = query.add_to_url(&self.base_url.join("BusquedaCotizacion/Buscar")?, page);
        let body = self.get_page(session, url).await?;
        listing::parse_search_page(&body)
    }

    /// Fetches the detail page for `idn` plus every secondary artifact it
    /// advertises: provider export, per-quote modals, and the buying-order
    /// page.
    pub async fn tender_snapshot(
        &self,
        session: &mut Session,
        idn: &str,
    ) -> Result<TenderSnapshot, Error> {
        let mut url = self.base_url.join("DetalleCotizacion/Detalle")?;
        url.query_pairs_mut().append_pair("idn", idn);
        let detail_html = self.get_page(session, url).await?;
        if html::text_by_id(&detail_html, "lblExternalCodeQuote").is_none() {
            return Err(Error::Structure {
                what: format!("detail page for {} without tender code", idn),
                body: detail_html,
            });
        }

        let mut snapshot = TenderSnapshot {
            detail_html,
            ..Default::default()
        };
        let request_id = html::attr_by_id(&snapshot.detail_html, "hdnIdSolicitud", "value")
            .filter(|v| !v.is_empty());

        if let Some(request_id) = &request_id {
            if html::element_by_id(&snapshot.detail_html, "lnkDownloadExcel").is_some() {
                let mut url = self
                    .base_url
                    .join("DetalleCotizacion/DescargarProveedores")?;
                url.query_pairs_mut().append_pair("solicitud", request_id);
                snapshot.provider_listing = Some(VirtualFile {
                    filename: format!("ProveedoresCotizacionCAgil_{}.xls", idn),
                    content: self.fetch_bytes(url).await?,
                });
            }

            let quote_ids = html::element_by_id(&snapshot.detail_html, "GvProvider")
                .map(|grid| html::attr_values(grid, "data-qs2"))
                .unwrap_or_default();
            for quote_id in &quote_ids {
                snapshot
                    .modals
                    .push(self.quote_modal(request_id, quote_id).await?);
            }

            if let Some(selected) = html::element_by_id(&snapshot.detail_html, "gvSeleccionado") {
                if let Some(quote_id) = html::attr_values(selected, "data-qs2").first() {
                    snapshot.selected_modal =
                        Some(self.quote_modal(request_id, quote_id).await?);
                }
            }
        }

        if let Some(href) = html::attr_by_id(&snapshot.detail_html, "lnkOrdenCompra", "href") {
            if !href.is_empty() && href != "#" {
                let url = self.base_url.join(&href)?;
                snapshot.buying_order_html = Some(self.fetch_html(url).await?);
            }
        }

        Ok(snapshot)
    }

    /// GETs an authenticated page, transparently logging in again (once) if
    /// the portal dropped the session mid-run.
    async fn get_page(&self, session: &mut Session, url: Url) -> Result<String, Error> {
        let body = self.fetch_html(url.clone()).await?;
        if !looks_logged_out(&body) {
            return Ok(body);
        }
        tracing::debug!("session expired, logging in again");
        let mut fresh = self.login().await?;
        fresh.renewed = true;
        *session = fresh;
        let body = self.fetch_html(url).await?;
        if looks_logged_out(&body) {
            return Err(Error::SessionExpired);
        }
        Ok(body)
    }

    async fn quote_modal(&self, request_id: &str, quote_id: &str) -> Result<String, Error> {
        let url = self
            .base_url
            .join("SeleccionProveedor/ObtenerDatosCotizacion")?;
        let payload = serde_json::json!({
            "idSolicitud": request_id,
            "idCotizacion": quote_id,
        });
        with_retry(&self.backoff, move || {
            let url = url.clone();
            let payload = payload.clone();
            async move {
                let resp = self.http.post(url).json(&payload).send().await?;
                read_body(resp).await
            }
        })
        .await
    }

    async fn post_form(&self, url: Url, form: &[(&str, String)]) -> Result<String, Error> {
        with_retry(&self.backoff, move || {
            let url = url.clone();
            async move {
                let resp = self
                    .page_request_headers(self.http.post(url).form(form))
                    .send()
                    .await?;
                read_body(resp).await
            }
        })
        .await
    }

    async fn fetch_html(&self, url: Url) -> Result<String, Error> {
        with_retry(&self.backoff, move || {
            let url = url.clone();
            async move {
                let resp = self
                    .page_request_headers(self.http.get(url))
                    .send()
                    .await?;
                read_body(resp).await
            }
        })
        .await
    }

    async fn fetch_bytes(&self, url: Url) -> Result<Vec<u8>, Error> {
        with_retry(&self.backoff, move || {
            let url = url.clone();
            async move {
                let resp = self
                    .page_request_headers(self.http.get(url))
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = truncate_body(&resp.text().await.unwrap_or_default());
                    tracing::error!("portal returned {}: {}", status, body);
                    return Err(Error::HttpStatus {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(resp.bytes().await?.to_vec())
            }
        })
        .await
    }

    fn page_request_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("accept-language", "es-CL,es;q=0.9")
        .header("sec-fetch-dest", "document")
        .header("sec-fetch-mode", "navigate")
        .header("sec-fetch-site", "same-origin")
    }
}

async fn read_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let snippet = truncate_body(&body);
        tracing::error!("portal returned {}: {}", status, snippet);
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body: snippet,
        });
    }
    Ok(body)
}

/// The portal answers authenticated URLs with the login shell once the
/// session cookie lapses.
fn looks_logged_out(body: &str) -> bool {
    html::element_by_id(body, "frmLogin").is_some()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}
