use crate::{
    db::DbPool,
    entities::gst_setting::{self, Entity as GstSetting, SINGLETON_ID},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Fallback when no settings row has been written yet.
pub const DEFAULT_GST_PERCENTAGE: Decimal = dec!(18.0);

/// Read/write access to the singleton GST configuration row.
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl SettingsService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Current GST percentage, defaulting to 18 when unset.
    pub async fn gst_percentage(&self) -> Result<Decimal, ServiceError> {
        let row = GstSetting::find_by_id(SINGLETON_ID).one(&*self.db).await?;
        Ok(row.map_or(DEFAULT_GST_PERCENTAGE, |r| r.gst_percentage))
    }

    /// Upserts the GST percentage. Takes effect for orders priced after the
    /// write; already-priced orders keep the rate they were quoted.
    #[instrument(skip(self))]
    pub async fn set_gst_percentage(
        &self,
        percentage: Decimal,
    ) -> Result<gst_setting::Model, ServiceError> {
        if percentage < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "GST percentage cannot be negative".to_string(),
            ));
        }

        let existing = GstSetting::find_by_id(SINGLETON_ID).one(&*self.db).await?;
        let old = existing
            .as_ref()
            .map_or(DEFAULT_GST_PERCENTAGE, |r| r.gst_percentage);

        let updated = match existing {
            Some(row) => {
                let mut model: gst_setting::ActiveModel = row.into();
                model.gst_percentage = Set(percentage);
                model.updated_at = Set(Utc::now());
                model.update(&*self.db).await?
            }
            None => {
                let model = gst_setting::ActiveModel {
                    id: Set(SINGLETON_ID),
                    gst_percentage: Set(percentage),
                    updated_at: Set(Utc::now()),
                };
                model.insert(&*self.db).await?
            }
        };

        info!(old = %old, new = %percentage, "GST rate updated");
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::GstRateChanged {
                    old,
                    new: percentage,
                })
                .await
            {
                warn!(error = %e, "Failed to send GST rate event");
            }
        }
        Ok(updated)
    }
}
