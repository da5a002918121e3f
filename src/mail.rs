//! Transactional email over SMTP.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::{config::SmtpConfig, entity::orders::Model as OrderModel};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    pub async fn send_verification(&self, to: &str, link: &str) -> Result<(), MailError> {
        let body = format!(
            "Welcome!\n\nConfirm your email address by opening the link below:\n\n{link}\n\nThe link expires in 24 hours."
        );
        self.send_text(to, "Confirm your email address", body).await
    }

    pub async fn send_order_confirmation(&self, to: &str, order: &OrderModel) -> Result<(), MailError> {
        self.send_text(
            to,
            &format!("Order {} received", order.order_number),
            order_summary("Thank you for your order.", order),
        )
        .await
    }

    pub async fn send_payment_receipt(&self, to: &str, order: &OrderModel) -> Result<(), MailError> {
        self.send_text(
            to,
            &format!("Payment received for order {}", order.order_number),
            order_summary("We have received your payment.", order),
        )
        .await
    }

    async fn send_text(&self, to: &str, subject: &str, body: String) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.transport.send(email).await?;
        tracing::debug!(to, subject, "email sent");
        Ok(())
    }
}

/// Sends through the configured mailer, logging instead of failing.
pub async fn deliver<F, Fut>(mailer: Option<&Mailer>, kind: &str, send: F)
where
    F: FnOnce(Mailer) -> Fut,
    Fut: std::future::Future<Output = Result<(), MailError>>,
{
    let Some(mailer) = mailer else {
        tracing::debug!(kind, "email skipped, SMTP not configured");
        return;
    };
    if let Err(err) = send(mailer.clone()).await {
        tracing::warn!(error = %err, kind, "email send failed");
    }
}

fn order_summary(greeting: &str, order: &OrderModel) -> String {
    format!(
        "{greeting}\n\nOrder: {}\nItems: {} GEL\nShipping: {} GEL\nTax: {} GEL\nTotal: {} GEL\n\nShipping to: {}, {}, {}",
        order.order_number,
        order.items_price,
        order.shipping_price,
        order.tax_price,
        order.total_price,
        order.shipping_address.full_name,
        order.shipping_address.street_address,
        order.shipping_address.city,
    )
}
