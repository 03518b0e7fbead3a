//! Booking endpoints; every call needs a bearer token

use booth_core::{
    validation_error, Booking, BookingUpdate, BoothResult, NewBooking, MAX_BOOTHS_PER_BOOKING,
};
use reqwest::Method;
use tracing::{debug, info};

use super::{escape_id, require_token, ApiClient, ApiEnvelope};

/// Client for `/booking`
#[derive(Clone)]
pub struct BookingsApi {
    client: ApiClient,
}

impl BookingsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Bookings visible to the caller (all bookings for administrators)
    pub async fn list(&self, token: &str) -> BoothResult<Vec<Booking>> {
        let token = require_token(token, "list_bookings")?;
        let envelope: ApiEnvelope<Vec<Booking>> = self
            .client
            .request(Method::GET, "booking", Some(token), None, "list_bookings")
            .await?;

        let bookings = envelope.data.unwrap_or_default();
        debug!("Fetched {} bookings", bookings.len());
        Ok(bookings)
    }

    pub async fn get(&self, id: &str, token: &str) -> BoothResult<Booking> {
        let token = require_token(token, "get_booking")?;
        let endpoint = format!("booking/{}", escape_id(id)?);
        let envelope: ApiEnvelope<Booking> = self
            .client
            .request(Method::GET, &endpoint, Some(token), None, "get_booking")
            .await?;

        envelope.into_data("get_booking")
    }

    pub async fn create(&self, booking: &NewBooking, token: &str) -> BoothResult<Booking> {
        let token = require_token(token, "create_booking")?;
        if booking.exhibition.trim().is_empty() {
            return Err(validation_error!(
                "An exhibition must be selected",
                "exhibition",
                "bookings_api"
            ));
        }
        check_amount(booking.amount)?;

        let body = serde_json::to_value(booking)?;
        let envelope: ApiEnvelope<Booking> = self
            .client
            .request(
                Method::POST,
                "booking",
                Some(token),
                Some(&body),
                "create_booking",
            )
            .await?;

        let created = envelope.into_data("create_booking")?;
        info!(booking_id = %created.id, exhibition = %booking.exhibition, "Created booking");
        Ok(created)
    }

    pub async fn update(
        &self,
        id: &str,
        update: &BookingUpdate,
        token: &str,
    ) -> BoothResult<Booking> {
        let token = require_token(token, "update_booking")?;
        if update.is_empty() {
            return Err(validation_error!(
                "Nothing to update",
                "update",
                "bookings_api"
            ));
        }
        if let Some(amount) = update.amount {
            check_amount(amount)?;
        }

        let endpoint = format!("booking/{}", escape_id(id)?);
        let body = serde_json::to_value(update)?;
        let envelope: ApiEnvelope<Booking> = self
            .client
            .request(
                Method::PUT,
                &endpoint,
                Some(token),
                Some(&body),
                "update_booking",
            )
            .await?;

        envelope.into_data("update_booking")
    }

    pub async fn delete(&self, id: &str, token: &str) -> BoothResult<()> {
        let token = require_token(token, "delete_booking")?;
        let endpoint = format!("booking/{}", escape_id(id)?);

        let _: ApiEnvelope<serde_json::Value> = self
            .client
            .request(Method::DELETE, &endpoint, Some(token), None, "delete_booking")
            .await?;

        info!(booking_id = %id, "Deleted booking");
        Ok(())
    }
}

fn check_amount(amount: u32) -> BoothResult<()> {
    if !(1..=MAX_BOOTHS_PER_BOOKING).contains(&amount) {
        return Err(validation_error!(
            format!("amount must be between 1 and {}", MAX_BOOTHS_PER_BOOKING),
            "amount",
            "bookings_api"
        ));
    }
    Ok(())
}
