use std::{env, str::FromStr};

use anyhow::Context;
use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::pricing::PricingConfig;

const DEFAULT_BOG_AUTH_URL: &str =
    "https://oauth2.bog.ge/auth/realms/bog/protocol/openid-connect/token";
const DEFAULT_BOG_API_URL: &str = "https://api.bog.ge/payments/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: SecretString,
    /// Base URL of the storefront, used for redirect and verification links.
    pub public_url: String,
    pub pricing: PricingConfig,
    pub bog: BogConfig,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct BogConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub api_url: String,
    pub callback_url: String,
    pub success_url: String,
    pub fail_url: String,
    pub locale: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = SecretString::from(env::var("JWT_SECRET").context("JWT_SECRET is not set")?);
        let public_url = env::var("APP_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();

        let pricing = PricingConfig {
            free_shipping_threshold: decimal_var(
                "SHIPPING_FREE_THRESHOLD",
                PricingConfig::default().free_shipping_threshold,
            )?,
            flat_shipping: decimal_var("SHIPPING_FLAT_RATE", PricingConfig::default().flat_shipping)?,
            tax_rate: decimal_var("TAX_RATE", PricingConfig::default().tax_rate)?,
        };

        let bog = BogConfig {
            client_id: env::var("BOG_CLIENT_ID").unwrap_or_default(),
            client_secret: SecretString::from(env::var("BOG_CLIENT_SECRET").unwrap_or_default()),
            auth_url: env::var("BOG_AUTH_URL").unwrap_or_else(|_| DEFAULT_BOG_AUTH_URL.to_string()),
            api_url: env::var("BOG_API_URL")
                .unwrap_or_else(|_| DEFAULT_BOG_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            callback_url: format!("{public_url}/api/payments/bog/callback"),
            success_url: format!("{public_url}/checkout/success"),
            fail_url: format!("{public_url}/checkout/failed"),
            locale: env::var("BOG_LOCALE").unwrap_or_else(|_| "ka".to_string()),
        };

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: SecretString::from(env::var("SMTP_PASSWORD").unwrap_or_default()),
                from_address: env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            public_url,
            pricing,
            bog,
            smtp,
        })
    }
}

fn decimal_var(key: &str, default: Decimal) -> anyhow::Result<Decimal> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim()).with_context(|| format!("{key} is not a decimal")),
        Err(_) => Ok(default),
    }
}
