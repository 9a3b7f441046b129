//! Local calendar arithmetic for digest dates, month windows and streak days.

use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Configured local offset; out-of-range values fall back to UTC.
pub fn local_offset(utc_offset_minutes: i32) -> UtcOffset {
	UtcOffset::from_whole_seconds(utc_offset_minutes.saturating_mul(60)).unwrap_or(UtcOffset::UTC)
}

pub fn local_now(now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
	now.to_offset(offset)
}

pub fn local_date(now: OffsetDateTime, offset: UtcOffset) -> Date {
	now.to_offset(offset).date()
}

pub fn start_of_day(date: Date, offset: UtcOffset) -> OffsetDateTime {
	PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset)
}

/// `[start, end)` of one local day.
pub fn day_window(date: Date, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
	let start = start_of_day(date, offset);

	(start, start + Duration::days(1))
}

/// Items summarized on the day before `digest_date`, as `[date - 1, date)`.
pub fn digest_window(digest_date: Date, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
	let end = start_of_day(digest_date, offset);

	(end - Duration::days(1), end)
}

/// `[first of month, first of next month)` around `now` in local time.
pub fn month_window(now: OffsetDateTime, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
	let local = local_date(now, offset);
	let first = local.replace_day(1).unwrap_or(local);
	let next = match first.month() {
		Month::December => Date::from_calendar_date(first.year() + 1, Month::January, 1),
		month => Date::from_calendar_date(first.year(), month.next(), 1),
	}
	.unwrap_or(first);

	(start_of_day(first, offset), start_of_day(next, offset))
}

/// `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// `YYYY-MM`.
pub fn format_month(date: Date) -> String {
	format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

pub fn parse_date(raw: &str) -> Option<Date> {
	let mut parts = raw.trim().splitn(3, '-');
	let year = parts.next()?.parse().ok()?;
	let month = Month::try_from(parts.next()?.parse::<u8>().ok()?).ok()?;
	let day = parts.next()?.parse().ok()?;

	Date::from_calendar_date(year, month, day).ok()
}
