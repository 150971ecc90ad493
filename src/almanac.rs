use chrono::{Datelike, Local, NaiveDate};

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn first_day_of_month(value: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(value.year(), value.month(), 1).unwrap_or(value)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

/// Shift a first-of-month date by whole months (negative deltas allowed).
pub fn add_months(month_start: NaiveDate, delta: i32) -> NaiveDate {
    let total = month_start.year() * 12 + month_start.month() as i32 - 1 + delta;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(month_start)
}

/// Due date for a competence month: the configured day, clamped to the last
/// day of that month.
pub fn due_date(competencia: NaiveDate, due_day: u32) -> NaiveDate {
    let last = days_in_month(competencia.year(), competencia.month());
    let day = due_day.min(last);
    NaiveDate::from_ymd_opt(competencia.year(), competencia.month(), day).unwrap_or(competencia)
}

/// `YYYY-MM-DD`, or None when absent/malformed.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.trim(), "%Y-%m-%d").ok()
}

/// `YYYY-MM` as a first-of-month date; anything else falls back to the
/// current month.
pub fn parse_month(value: Option<&str>, hoje: NaiveDate) -> NaiveDate {
    let fallback = first_day_of_month(hoje);
    let Some(raw) = value else {
        return fallback;
    };
    let Some((y, m)) = raw.trim().split_once('-') else {
        return fallback;
    };
    let (Ok(year), Ok(month)) = (y.parse::<i32>(), m.parse::<u32>()) else {
        return fallback;
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(fallback)
}

pub fn format_iso(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn format_br(value: NaiveDate) -> String {
    value.format("%d/%m/%Y").to_string()
}

pub fn format_competencia(value: NaiveDate) -> String {
    value.format("%Y-%m").to_string()
}

/// Completed years between birth date and the reference date.
pub fn age_on(nascimento: NaiveDate, referencia: NaiveDate) -> i64 {
    let mut idade = i64::from(referencia.year() - nascimento.year());
    if (referencia.month(), referencia.day()) < (nascimento.month(), nascimento.day()) {
        idade -= 1;
    }
    idade
}

fn anniversary_in(nascimento: NaiveDate, year: i32) -> NaiveDate {
    // Feb 29 birthdays observe Feb 28 in non-leap years.
    NaiveDate::from_ymd_opt(year, nascimento.month(), nascimento.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, nascimento.month(), nascimento.day() - 1))
        .unwrap_or(nascimento)
}

/// Days until the next occurrence of the birth month/day, wrapping to next
/// year when this year's date has already passed. Zero on the birthday itself.
pub fn days_to_birthday(nascimento: NaiveDate, referencia: NaiveDate) -> i64 {
    let mut proximo = anniversary_in(nascimento, referencia.year());
    if proximo < referencia {
        proximo = anniversary_in(nascimento, referencia.year() + 1);
    }
    (proximo - referencia).num_days()
}
