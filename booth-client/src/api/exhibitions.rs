//! Exhibition endpoints
//!
//! Reads are public; create, update and delete need an administrator token.

use booth_core::{
    validation_error, BoothResult, Exhibition, ExhibitionUpdate, NewExhibition,
};
use reqwest::Method;
use tracing::{debug, info};

use super::{escape_id, require_token, ApiClient, ApiEnvelope};

/// Client for `/exhibitions`
#[derive(Clone)]
pub struct ExhibitionsApi {
    client: ApiClient,
}

impl ExhibitionsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// List all exhibitions
    pub async fn list(&self, token: Option<&str>) -> BoothResult<Vec<Exhibition>> {
        let envelope: ApiEnvelope<Vec<Exhibition>> = self
            .client
            .request(Method::GET, "exhibitions", token, None, "list_exhibitions")
            .await?;

        let exhibitions = envelope.data.unwrap_or_default();
        debug!("Fetched {} exhibitions", exhibitions.len());
        Ok(exhibitions)
    }

    /// Fetch one exhibition by id
    pub async fn get(&self, id: &str, token: Option<&str>) -> BoothResult<Exhibition> {
        let endpoint = format!("exhibitions/{}", escape_id(id)?);
        let envelope: ApiEnvelope<Exhibition> = self
            .client
            .request(Method::GET, &endpoint, token, None, "get_exhibition")
            .await?;

        envelope.into_data("get_exhibition")
    }

    /// Create an exhibition (admin only)
    pub async fn create(&self, exhibition: &NewExhibition, token: &str) -> BoothResult<Exhibition> {
        let token = require_token(token, "create_exhibition")?;
        validate_new(exhibition)?;

        let body = serde_json::to_value(exhibition)?;
        let envelope: ApiEnvelope<Exhibition> = self
            .client
            .request(
                Method::POST,
                "exhibitions",
                Some(token),
                Some(&body),
                "create_exhibition",
            )
            .await?;

        let created = envelope.into_data("create_exhibition")?;
        info!(exhibition_id = %created.id, "Created exhibition");
        Ok(created)
    }

    /// Update the set fields of an exhibition (admin only)
    pub async fn update(
        &self,
        id: &str,
        update: &ExhibitionUpdate,
        token: &str,
    ) -> BoothResult<Exhibition> {
        let token = require_token(token, "update_exhibition")?;
        if update.is_empty() {
            return Err(validation_error!(
                "Nothing to update",
                "update",
                "exhibitions_api"
            ));
        }
        if update.duration_day == Some(0) {
            return Err(validation_error!(
                "durationDay must be at least 1",
                "durationDay",
                "exhibitions_api"
            ));
        }

        let endpoint = format!("exhibitions/{}", escape_id(id)?);
        let body = serde_json::to_value(update)?;
        let envelope: ApiEnvelope<Exhibition> = self
            .client
            .request(
                Method::PUT,
                &endpoint,
                Some(token),
                Some(&body),
                "update_exhibition",
            )
            .await?;

        envelope.into_data("update_exhibition")
    }

    /// Delete an exhibition (admin only)
    pub async fn delete(&self, id: &str, token: &str) -> BoothResult<()> {
        let token = require_token(token, "delete_exhibition")?;
        let endpoint = format!("exhibitions/{}", escape_id(id)?);

        let _: ApiEnvelope<serde_json::Value> = self
            .client
            .request(Method::DELETE, &endpoint, Some(token), None, "delete_exhibition")
            .await?;

        info!(exhibition_id = %id, "Deleted exhibition");
        Ok(())
    }
}

fn validate_new(exhibition: &NewExhibition) -> BoothResult<()> {
    if exhibition.name.trim().is_empty() {
        return Err(validation_error!(
            "Exhibition name must not be empty",
            "name",
            "exhibitions_api"
        ));
    }
    if exhibition.venue.trim().is_empty() {
        return Err(validation_error!(
            "Venue must not be empty",
            "venue",
            "exhibitions_api"
        ));
    }
    if exhibition.duration_day == 0 {
        return Err(validation_error!(
            "durationDay must be at least 1",
            "durationDay",
            "exhibitions_api"
        ));
    }
    Ok(())
}
