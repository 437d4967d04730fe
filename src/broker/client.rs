// =============================================================================
// KIS OpenAPI client — token lifecycle, hashkey, request pacing
// =============================================================================
//
// REST client for the Korea Investment & Securities OpenAPI covering quotes,
// cash orders and balance inquiries on both the domestic and overseas books.
// Mock (VTS) and live hosts use disjoint transaction-id tables.
//
// Session rules:
//   - the access token is issued lazily and refreshed within five minutes of
//     expiry; refresh is single-flight behind the session mutex;
//   - a 401 clears the cached token and the request retries exactly once;
//     a second 401 surfaces as an auth error.
//
// Pacing: at most one request per 60 ms per client instance (the account-wide
// budget is ~20 req/s). The gate sleeps on the tokio timer, it never spins.
//
// SECURITY: the app secret is never logged; `Debug` redacts credentials.
// =============================================================================

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::broker::Broker;
use crate::config::BrokerSettings;
use crate::error::{AppError, AppResult};
use crate::types::{
    is_domestic_symbol, is_overseas_symbol, Balance, BalanceSummary, Exchange, OrderReceipt,
    OrderSide, Position, Quote,
};

const BASE_URL_PROD: &str = "https://openapi.koreainvestment.com:9443";
const BASE_URL_MOCK: &str = "https://openapivts.koreainvestment.com:29443";

// Transaction ids: (mock, live). Quotes share one id across both modes.
const TR_ID_PRICE: &str = "FHKST01010100";
const TR_ID_OVERSEAS_PRICE: &str = "HHDFS00000300";
const TR_ID_BUY: (&str, &str) = ("VTTC0802U", "TTTC0802U");
const TR_ID_SELL: (&str, &str) = ("VTTC0801U", "TTTC0801U");
const TR_ID_BALANCE: (&str, &str) = ("VTTC8434R", "TTTC8434R");
const TR_ID_OVERSEAS_BUY: (&str, &str) = ("VTTT1002U", "JTTT1002U");
const TR_ID_OVERSEAS_SELL: (&str, &str) = ("VTTT1006U", "JTTT1006U");
const TR_ID_OVERSEAS_BALANCE: (&str, &str) = ("VTTS3012R", "TTTS3012R");

const ORD_DVSN_MARKET: &str = "01";
const ORD_DVSN_LIMIT: &str = "00";

/// Minimum spacing between requests from one client instance.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(60);

/// Refresh the token this long before its actual expiry.
const TOKEN_REFRESH_MARGIN: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Default)]
struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn valid_token(&self) -> Option<&str> {
        let token = self.token.as_deref()?;
        let expires_at = self.expires_at?;
        if Utc::now() < expires_at - TOKEN_REFRESH_MARGIN {
            Some(token)
        } else {
            None
        }
    }
}

/// KIS OpenAPI REST client.
pub struct KisClient {
    app_key: String,
    app_secret: String,
    /// Account number, first 8 digits.
    cano: String,
    /// Account product code, last 2 digits.
    acnt_prdt_cd: String,
    mock: bool,
    base_url: String,
    http: reqwest::Client,
    session: Mutex<Session>,
    /// Monotonic instant of the previous request, for the pacing gate.
    last_request: Mutex<Option<Instant>>,
}

impl KisClient {
    pub fn new(settings: &BrokerSettings) -> AppResult<Self> {
        if settings.app_key.is_empty() || settings.app_secret.is_empty() {
            return Err(AppError::validation("app_key and app_secret are required"));
        }
        let Some((cano, acnt_prdt_cd)) = settings.account_no.split_once('-') else {
            return Err(AppError::validation_with(
                "account_no must look like 'XXXXXXXX-XX'",
                serde_json::json!({ "account_no": settings.account_no }),
            ));
        };

        let base_url = if settings.mock { BASE_URL_MOCK } else { BASE_URL_PROD };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        info!(
            mock = settings.mock,
            account = %format!("{}***", &cano[..cano.len().min(4)]),
            "KisClient initialised"
        );

        Ok(Self {
            app_key: settings.app_key.clone(),
            app_secret: settings.app_secret.clone(),
            cano: cano.to_string(),
            acnt_prdt_cd: acnt_prdt_cd.to_string(),
            mock: settings.mock,
            base_url: base_url.to_string(),
            http,
            session: Mutex::new(Session::default()),
            last_request: Mutex::new(None),
        })
    }

    fn tr(&self, pair: (&'static str, &'static str)) -> &'static str {
        if self.mock {
            pair.0
        } else {
            pair.1
        }
    }

    // -------------------------------------------------------------------------
    // Pacing
    // -------------------------------------------------------------------------

    /// Sleep until the pacing interval since the previous request has passed.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    /// Return a valid token, issuing one when missing or near expiry. The
    /// session mutex makes concurrent refreshes single-flight: late callers
    /// find the fresh token under the same lock.
    async fn access_token(&self) -> AppResult<String> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.valid_token() {
            return Ok(token.to_string());
        }

        info!("issuing broker access token");
        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.app_key,
            "appsecret": self.app_secret,
        });

        let resp = self
            .http
            .post(format!("{}/oauth2/tokenP", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::broker(format!("token request failed: {e}")))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::broker(format!("token response parse failed: {e}")))?;

        if !status.is_success() {
            return Err(AppError::auth_with(
                "token issuance failed",
                serde_json::json!({ "status": status.as_u16(), "body": data }),
            ));
        }

        let token = data["access_token"]
            .as_str()
            .ok_or_else(|| AppError::auth("token response missing access_token"))?
            .to_string();

        // Expiry format on the wire: "2026-02-14 06:11:00".
        let expires_at = data["access_token_token_expired"]
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(24));

        info!(expires_at = %expires_at, "broker access token issued");
        session.token = Some(token.clone());
        session.expires_at = Some(expires_at);
        Ok(token)
    }

    async fn clear_token(&self) {
        let mut session = self.session.lock().await;
        session.token = None;
        session.expires_at = None;
    }

    // -------------------------------------------------------------------------
    // Hashkey
    // -------------------------------------------------------------------------

    /// Fetch the request-body hash required on order POSTs. Issued per order,
    /// never cached.
    async fn hashkey(&self, body: &Value) -> AppResult<String> {
        let resp = self
            .http
            .post(format!("{}/uapi/hashkey", self.base_url))
            .header("appkey", &self.app_key)
            .header("appsecret", &self.app_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::broker(format!("hashkey request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::broker(format!("hashkey request rejected: {e}")))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::broker(format!("hashkey response parse failed: {e}")))?;

        data["HASH"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::broker("hashkey response missing HASH"))
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    async fn request_get(
        &self,
        path: &str,
        tr_id: &str,
        params: &[(&str, String)],
    ) -> AppResult<Value> {
        let mut retried = false;
        loop {
            self.pace().await;
            let token = self.access_token().await?;

            let resp = self
                .http
                .get(format!("{}{}", self.base_url, path))
                .query(params)
                .header("authorization", format!("Bearer {token}"))
                .header("appkey", &self.app_key)
                .header("appsecret", &self.app_secret)
                .header("tr_id", tr_id)
                .header("custtype", "P")
                .send()
                .await
                .map_err(|e| {
                    AppError::broker_with(
                        format!("broker request failed: {e}"),
                        serde_json::json!({ "path": path }),
                    )
                })?;

            match self.decode_response(resp, path, &mut retried).await? {
                Some(body) => return Ok(body),
                None => continue,
            }
        }
    }

    async fn request_post(
        &self,
        path: &str,
        tr_id: &str,
        body: &Value,
        use_hashkey: bool,
    ) -> AppResult<Value> {
        let mut retried = false;
        loop {
            self.pace().await;
            let token = self.access_token().await?;

            let mut request = self
                .http
                .post(format!("{}{}", self.base_url, path))
                .header("authorization", format!("Bearer {token}"))
                .header("appkey", &self.app_key)
                .header("appsecret", &self.app_secret)
                .header("tr_id", tr_id)
                .header("custtype", "P");

            if use_hashkey {
                request = request.header("hashkey", self.hashkey(body).await?);
            }

            let resp = request.json(body).send().await.map_err(|e| {
                AppError::broker_with(
                    format!("broker request failed: {e}"),
                    serde_json::json!({ "path": path }),
                )
            })?;

            match self.decode_response(resp, path, &mut retried).await? {
                Some(body) => return Ok(body),
                None => continue,
            }
        }
    }

    /// Decode a broker response. `Ok(None)` means a 401 was consumed and the
    /// caller should retry once with a fresh token.
    async fn decode_response(
        &self,
        resp: reqwest::Response,
        path: &str,
        retried: &mut bool,
    ) -> AppResult<Option<Value>> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            self.clear_token().await;
            if !*retried {
                *retried = true;
                warn!(path, "broker returned 401, reissuing token and retrying once");
                return Ok(None);
            }
            return Err(AppError::auth_with(
                "broker authentication failed after token refresh",
                serde_json::json!({ "path": path }),
            ));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::broker(format!("broker response parse failed: {e}")))?;

        if !status.is_success() {
            return Err(AppError::broker_with(
                format!("broker HTTP error ({status})"),
                serde_json::json!({ "path": path, "body": body }),
            ));
        }

        check_response_code(&body, path)?;
        Ok(Some(body))
    }
}

/// Reject responses whose application-level code (`rt_cd`) is non-zero.
fn check_response_code(body: &Value, path: &str) -> AppResult<()> {
    let rt_cd = body["rt_cd"].as_str().unwrap_or("0");
    if rt_cd != "0" {
        let msg = body["msg1"].as_str().unwrap_or("unknown broker error");
        let msg_cd = body["msg_cd"].as_str().unwrap_or("");
        return Err(AppError::broker_with(
            format!("broker API error ({msg_cd}): {msg}"),
            serde_json::json!({ "path": path, "rt_cd": rt_cd, "msg_cd": msg_cd }),
        ));
    }
    Ok(())
}

// =============================================================================
// Field helpers and response mapping
// =============================================================================

/// Read a numeric field that arrives as either a bare number or a string.
fn num(value: &Value, key: &str) -> f64 {
    let field = &value[key];
    if let Some(n) = field.as_f64() {
        return n;
    }
    field.as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0)
}

/// As [`num`], but absent/unparseable fields stay `None`.
fn opt_num(value: &Value, key: &str) -> Option<f64> {
    let field = &value[key];
    if let Some(n) = field.as_f64() {
        return Some(n);
    }
    field.as_str().and_then(|s| s.parse().ok())
}

fn text(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

/// Map the domestic price output to a [`Quote`].
fn parse_domestic_quote(code: &str, output: &Value) -> Quote {
    let name = match text(output, "hts_kor_isnm") {
        s if s.is_empty() => code.to_string(),
        s => s,
    };
    Quote {
        symbol: code.to_string(),
        name,
        price: num(output, "stck_prpr"),
        prior_day_change_pct: num(output, "prdy_ctrt"),
        high: num(output, "stck_hgpr"),
        low: num(output, "stck_lwpr"),
        per: opt_num(output, "per"),
        pbr: opt_num(output, "pbr"),
    }
}

/// Map the overseas price output to a [`Quote`].
fn parse_overseas_quote(ticker: &str, output: &Value) -> Quote {
    let name = match text(output, "rsym") {
        s if s.is_empty() => ticker.to_string(),
        s => s,
    };
    Quote {
        symbol: ticker.to_string(),
        name,
        price: num(output, "last"),
        prior_day_change_pct: num(output, "rate"),
        high: num(output, "high"),
        low: num(output, "low"),
        per: opt_num(output, "per"),
        pbr: opt_num(output, "pbr"),
    }
}

fn parse_order_receipt(output: &Value) -> OrderReceipt {
    OrderReceipt {
        order_no: text(output, "ODNO"),
        order_time: text(output, "ORD_TMD"),
    }
}

/// Map the domestic balance outputs (holdings + summary) to a [`Balance`].
fn parse_domestic_balance(body: &Value) -> Balance {
    let positions = body["output1"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter(|row| num(row, "hldg_qty") > 0.0)
                .map(|row| Position {
                    symbol: text(row, "pdno"),
                    name: text(row, "prdt_name"),
                    quantity: num(row, "hldg_qty") as u32,
                    avg_cost: num(row, "pchs_avg_pric"),
                    current_price: num(row, "prpr"),
                    pnl_amount: num(row, "evlu_pfls_amt"),
                    pnl_pct: num(row, "evlu_pfls_rt"),
                })
                .collect()
        })
        .unwrap_or_default();

    let summary_row = body["output2"]
        .as_array()
        .and_then(|rows| rows.first())
        .cloned()
        .unwrap_or(Value::Null);

    Balance {
        positions,
        summary: BalanceSummary {
            cash: num(&summary_row, "dnca_tot_amt"),
            total_value: num(&summary_row, "tot_evlu_amt"),
        },
    }
}

/// Map the overseas balance outputs to a [`Balance`].
fn parse_overseas_balance(body: &Value) -> Balance {
    let positions = body["output1"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter(|row| num(row, "ovrs_cblc_qty") > 0.0)
                .map(|row| Position {
                    symbol: text(row, "ovrs_pdno"),
                    name: text(row, "ovrs_item_name"),
                    quantity: num(row, "ovrs_cblc_qty") as u32,
                    avg_cost: num(row, "pchs_avg_pric"),
                    current_price: num(row, "now_pric2"),
                    pnl_amount: num(row, "frcr_evlu_pfls_amt"),
                    pnl_pct: num(row, "evlu_pfls_rt"),
                })
                .collect()
        })
        .unwrap_or_default();

    let summary = &body["output2"];
    Balance {
        positions,
        summary: BalanceSummary {
            cash: num(summary, "frcr_dncl_amt_2"),
            total_value: num(summary, "tot_evlu_pfls_amt"),
        },
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_domestic_code(code: &str) -> AppResult<()> {
    if !is_domestic_symbol(code) {
        return Err(AppError::validation_with(
            "domestic symbol must be exactly six digits",
            serde_json::json!({ "symbol": code }),
        ));
    }
    Ok(())
}

fn validate_overseas_ticker(ticker: &str) -> AppResult<()> {
    if !is_overseas_symbol(ticker) {
        return Err(AppError::validation_with(
            "overseas ticker must be upper-case letters and dots",
            serde_json::json!({ "symbol": ticker }),
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: u32) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::validation_with(
            "order quantity must be at least 1",
            serde_json::json!({ "quantity": quantity }),
        ));
    }
    Ok(())
}

// =============================================================================
// Broker impl
// =============================================================================

#[async_trait]
impl Broker for KisClient {
    #[instrument(skip(self), name = "kis::quote")]
    async fn quote(&self, code: &str) -> AppResult<Quote> {
        validate_domestic_code(code)?;
        debug!(code, "fetching domestic quote");
        let body = self
            .request_get(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                TR_ID_PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", code.to_string()),
                ],
            )
            .await?;
        Ok(parse_domestic_quote(code, &body["output"]))
    }

    #[instrument(skip(self), name = "kis::quote_overseas")]
    async fn quote_overseas(&self, ticker: &str, exchange: Exchange) -> AppResult<Quote> {
        validate_overseas_ticker(ticker)?;
        debug!(ticker, exchange = %exchange, "fetching overseas quote");
        let body = self
            .request_get(
                "/uapi/overseas-price/v1/quotations/price",
                TR_ID_OVERSEAS_PRICE,
                &[
                    ("AUTH", String::new()),
                    ("EXCD", exchange.as_code().to_string()),
                    ("SYMB", ticker.to_string()),
                ],
            )
            .await?;
        Ok(parse_overseas_quote(ticker, &body["output"]))
    }

    #[instrument(skip(self), name = "kis::place_order")]
    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<u32>,
    ) -> AppResult<OrderReceipt> {
        validate_domestic_code(code)?;
        validate_quantity(quantity)?;

        let tr_id = match side {
            OrderSide::Buy => self.tr(TR_ID_BUY),
            OrderSide::Sell => self.tr(TR_ID_SELL),
        };
        let (ord_dvsn, ord_unpr) = match price {
            None => (ORD_DVSN_MARKET, "0".to_string()),
            Some(p) => (ORD_DVSN_LIMIT, p.to_string()),
        };

        let body = serde_json::json!({
            "CANO": self.cano,
            "ACNT_PRDT_CD": self.acnt_prdt_cd,
            "PDNO": code,
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": quantity.to_string(),
            "ORD_UNPR": ord_unpr,
        });

        info!(code, side = %side, quantity, price = ?price, "placing domestic order");
        let data = self
            .request_post("/uapi/domestic-stock/v1/trading/order-cash", tr_id, &body, true)
            .await
            .map_err(reject_as_order_error)?;

        let receipt = parse_order_receipt(&data["output"]);
        info!(order_no = %receipt.order_no, order_time = %receipt.order_time, "domestic order accepted");
        Ok(receipt)
    }

    #[instrument(skip(self), name = "kis::place_overseas_order")]
    async fn place_overseas_order(
        &self,
        ticker: &str,
        exchange: Exchange,
        side: OrderSide,
        quantity: u32,
        price: f64,
    ) -> AppResult<OrderReceipt> {
        validate_overseas_ticker(ticker)?;
        validate_quantity(quantity)?;
        if price <= 0.0 {
            return Err(AppError::validation_with(
                "overseas orders require a positive limit price",
                serde_json::json!({ "price": price }),
            ));
        }

        let tr_id = match side {
            OrderSide::Buy => self.tr(TR_ID_OVERSEAS_BUY),
            OrderSide::Sell => self.tr(TR_ID_OVERSEAS_SELL),
        };

        let body = serde_json::json!({
            "CANO": self.cano,
            "ACNT_PRDT_CD": self.acnt_prdt_cd,
            "OVRS_EXCG_CD": exchange.as_code(),
            "PDNO": ticker,
            "ORD_QTY": quantity.to_string(),
            "OVRS_ORD_UNPR": format!("{price:.2}"),
            "ORD_SVR_DVSN_CD": "0",
            "ORD_DVSN": ORD_DVSN_LIMIT,
        });

        info!(ticker, exchange = %exchange, side = %side, quantity, price, "placing overseas order");
        let data = self
            .request_post("/uapi/overseas-stock/v1/trading/order", tr_id, &body, true)
            .await
            .map_err(reject_as_order_error)?;

        let receipt = parse_order_receipt(&data["output"]);
        info!(order_no = %receipt.order_no, "overseas order accepted");
        Ok(receipt)
    }

    #[instrument(skip(self), name = "kis::balance")]
    async fn balance(&self) -> AppResult<Balance> {
        let body = self
            .request_get(
                "/uapi/domestic-stock/v1/trading/inquire-balance",
                self.tr(TR_ID_BALANCE),
                &[
                    ("CANO", self.cano.clone()),
                    ("ACNT_PRDT_CD", self.acnt_prdt_cd.clone()),
                    ("AFHR_FLPR_YN", "N".to_string()),
                    ("OFL_YN", String::new()),
                    ("INQR_DVSN", "02".to_string()),
                    ("UNPR_DVSN", "01".to_string()),
                    ("FUND_STTL_ICLD_YN", "N".to_string()),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
                    ("PRCS_DVSN", "01".to_string()),
                    ("CTX_AREA_FK100", String::new()),
                    ("CTX_AREA_NK100", String::new()),
                ],
            )
            .await?;

        let balance = parse_domestic_balance(&body);
        debug!(holdings = balance.positions.len(), "domestic balance fetched");
        Ok(balance)
    }

    #[instrument(skip(self), name = "kis::overseas_balance")]
    async fn overseas_balance(&self) -> AppResult<Balance> {
        let body = self
            .request_get(
                "/uapi/overseas-stock/v1/trading/inquire-balance",
                self.tr(TR_ID_OVERSEAS_BALANCE),
                &[
                    ("CANO", self.cano.clone()),
                    ("ACNT_PRDT_CD", self.acnt_prdt_cd.clone()),
                    ("OVRS_EXCG_CD", "NASD".to_string()),
                    ("TR_CRCY_CD", "USD".to_string()),
                    ("CTX_AREA_FK200", String::new()),
                    ("CTX_AREA_NK200", String::new()),
                ],
            )
            .await?;

        let balance = parse_overseas_balance(&body);
        debug!(holdings = balance.positions.len(), "overseas balance fetched");
        Ok(balance)
    }
}

/// Order endpoints convert broker-level rejections into order errors (final,
/// skip the symbol); auth and network failures pass through untouched.
fn reject_as_order_error(err: AppError) -> AppError {
    match err {
        AppError::Broker { message, detail } => AppError::Order { message, detail },
        other => other,
    }
}

impl std::fmt::Debug for KisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KisClient")
            .field("app_key", &"<redacted>")
            .field("app_credential", &"<redacted>")
            .field("account", &format!("{}-{}", self.cano, self.acnt_prdt_cd))
            .field("mock", &self.mock)
            .field("base_url", &self.base_url)
            .finish()
    }
}
