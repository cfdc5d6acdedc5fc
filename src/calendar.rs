//! Arithmétique des périodes : numéro de shift <-> fenêtre de dates.

use crate::model::{Period, Rotation};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};

/// Numéro renvoyé pour un instant antérieur au début de la rotation.
pub const NO_SHIFT: i64 = -1;

impl Rotation {
    pub fn start_time(&self) -> DateTime<Utc> {
        midnight(self.start)
    }

    /// Fenêtre `[start, end)` du shift `number` ; `None` si `number < 0` ou débordement.
    pub fn shift_dates_for_number(&self, number: i64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if number < 0 {
            return None;
        }
        let start = self.shift_start_date(number)?;
        let end = self.shift_start_date(number.checked_add(1)?)?;
        Some((midnight(start), midnight(end)))
    }

    /// Numéro du shift contenant `t`, ou [`NO_SHIFT`] avant le début.
    pub fn shift_number_for_time(&self, t: DateTime<Utc>) -> i64 {
        let origin = self.start_time();
        if t < origin {
            return NO_SHIFT;
        }
        match self.period {
            Period::Weekly => (t - origin).num_days() / 7,
            Period::Biweekly => (t - origin).num_days() / 14,
            Period::Monthly => {
                let date = t.date_naive();
                let months = i64::from(date.year() - self.start.year()) * 12
                    + i64::from(date.month()) - i64::from(self.start.month());
                match self.shift_start_date(months) {
                    Some(start) if start > date => months - 1,
                    _ => months,
                }
            }
        }
    }

    fn shift_start_date(&self, number: i64) -> Option<NaiveDate> {
        match self.period {
            Period::Weekly => self.start.checked_add_signed(Duration::try_days(number.checked_mul(7)?)?),
            Period::Biweekly => self.start.checked_add_signed(Duration::try_days(number.checked_mul(14)?)?),
            Period::Monthly => {
                let months = u32::try_from(number).ok()?;
                self.start.checked_add_months(Months::new(months))
            }
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
