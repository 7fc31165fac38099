//! Domain types: rooms, stay intervals, bookings and payment receipts.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{BookingError, Result};

/// Rooms are identified by their room number.
pub type RoomNumber = u32;

/// Pricing and capacity attributes shared by all rooms of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    /// Price per night in minor currency units (e.g. cents).
    pub nightly_rate: u64,
    pub capacity: u8,
    pub amenities: Vec<String>,
}

/// A half-open stay interval `[check_in, check_out)`.
///
/// The check-out day itself is not occupied, so back-to-back bookings where
/// one guest leaves on the day another arrives never collide in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayRange {
    /// Builds a stay interval, rejecting empty or inverted ranges.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_out <= check_in {
            return Err(BookingError::Validation(format!(
                "check-out {check_out} must be after check-in {check_in}"
            )));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Number of nights, always at least one.
    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days() as u32
    }

    /// Iterates over every occupied calendar day of the stay.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        std::iter::successors(Some(self.check_in), |day| day.succ_opt())
            .take_while(move |day| *day < self.check_out)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.check_in && day < self.check_out
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl fmt::Display for StayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.check_in, self.check_out)
    }
}

/// Unique booking identifier: check-in date, room number and a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(String);

impl BookingId {
    pub fn generate(check_in: NaiveDate, room: RoomNumber) -> Self {
        let suffix: u16 = rand::rng().random();
        BookingId(format!(
            "BK-{}-{}-{:04X}",
            check_in.format("%Y%m%d"),
            room,
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(value: &str) -> Self {
        BookingId(value.to_string())
    }
}

/// A confirmed reservation of one room for one stay interval.
///
/// `last_modified` is the marker the optimistic version guard compares at
/// write time; every successful mutation must bump it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room: RoomNumber,
    pub stay: StayRange,
    pub guest: String,
    /// Total price in minor units: nights × nightly rate at booking time.
    pub total: u64,
    pub created_at: NaiveDateTime,
    pub last_modified: NaiveDateTime,
}

impl Booking {
    pub fn new(
        room: RoomNumber,
        stay: StayRange,
        guest: String,
        nightly_rate: u64,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: BookingId::generate(stay.check_in(), room),
            room,
            stay,
            guest,
            total: nightly_rate * stay.nights() as u64,
            created_at: now,
            last_modified: now,
        }
    }

    /// Recomputes the total after a date change.
    pub fn reprice(&mut self, nightly_rate: u64) {
        self.total = nightly_rate * self.stay.nights() as u64;
    }
}

/// Payment confirmation for exactly one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub booking: BookingId,
    /// Must equal the booking's total at issue time.
    pub amount: u64,
    pub issued_at: NaiveDateTime,
}

impl Receipt {
    /// Receipt numbers are a year-scoped running sequence.
    pub fn number(year: i32, sequence: u32) -> String {
        format!("RC-{year}-{sequence:06}")
    }

    pub fn year_of(timestamp: NaiveDateTime) -> i32 {
        timestamp.date().year()
    }
}
