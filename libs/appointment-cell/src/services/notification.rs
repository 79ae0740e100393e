use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use schedule_cell::Appointment;
use shared_config::AppConfig;

/// Tells the outside world about bookings. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn appointment_booked(&self, appointment: &Appointment) -> Result<()>;
}

/// POSTs booking events to a webhook (mail relay, automation tool, ...).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn appointment_booked(&self, appointment: &Appointment) -> Result<()> {
        let payload = json!({
            "event": "appointment.booked",
            "appointment": appointment,
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("sending booking notification")?
            .error_for_status()
            .context("booking notification rejected")?;

        info!("Booking notification sent for appointment {}", appointment.id);
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn appointment_booked(&self, appointment: &Appointment) -> Result<()> {
        info!(
            "Appointment {} booked for patient {} on {} at {}",
            appointment.id,
            appointment.patient_id,
            appointment.appointment_date,
            appointment.appointment_time
        );
        Ok(())
    }
}

pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.notification_webhook_url {
        Some(url) if config.is_notification_configured() => Arc::new(WebhookNotifier::new(url.clone())),
        _ => Arc::new(LogNotifier),
    }
}

/// Fire and forget; a failed notification never undoes the booking.
pub fn notify_in_background(notifier: Arc<dyn Notifier>, appointment: Appointment) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.appointment_booked(&appointment).await {
            warn!("Notification for appointment {} failed: {:#}", appointment.id, e);
        }
    })
}
