/// Month tabs are named `Mon YY` (e.g. `Apr 25`), but requests arrive as
/// `April 2025`, `april 25` or `Apr 25`.
const MONTHS: [(&str, &str); 12] = [
    ("january", "Jan"),
    ("february", "Feb"),
    ("march", "Mar"),
    ("april", "Apr"),
    ("may", "May"),
    ("june", "Jun"),
    ("july", "Jul"),
    ("august", "Aug"),
    ("september", "Sep"),
    ("october", "Oct"),
    ("november", "Nov"),
    ("december", "Dec"),
];

/// Normalize a month/year label to `Mon YY`. Returns `None` when no month name is present.
pub fn standard_month_label(label: &str) -> Option<String> {
    let lower = label.trim().to_lowercase();
    let mut words = lower.split_whitespace();
    let month_word = words.next()?;
    let (_, short) = MONTHS.iter().find(|(full, short)| {
        let short = short.to_lowercase();
        month_word == *full || month_word == short || (month_word.len() >= 3 && full.starts_with(month_word))
    })?;

    let year = words.last().unwrap_or_default();
    let year = if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        &year[2..]
    } else {
        year
    };
    if year.is_empty() {
        return Some((*short).to_string());
    }
    Some(format!("{short} {year}"))
}

/// Pick the worksheet a month label refers to.
///
/// Exact (case-insensitive) match on the normalized label wins; otherwise the first
/// sheet whose name contains both the month abbreviation and the two-digit year.
pub fn resolve_month_sheet<'a, I>(sheet_names: I, label: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: Clone,
{
    let names = sheet_names.into_iter();
    if let Some(exact) = names
        .clone()
        .find(|name| name.trim().eq_ignore_ascii_case(label.trim()))
    {
        return Some(exact);
    }

    let standard = standard_month_label(label)?;
    if let Some(exact) = names
        .clone()
        .find(|name| name.trim().eq_ignore_ascii_case(&standard))
    {
        return Some(exact);
    }

    let (month, year) = standard.split_once(' ')?;
    let month = month.to_lowercase();
    names.into_iter().find(|name| {
        let lower = name.to_lowercase();
        lower.contains(&month) && lower.contains(year)
    })
}
