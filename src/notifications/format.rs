use crate::alerts::AlertProperty;
use crate::runner::CityReport;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Listings shown in an email digest before "...and N more"
pub const EMAIL_DIGEST_LIMIT: usize = 10;
/// Listings shown in a Telegram digest
pub const TELEGRAM_DIGEST_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Telegram,
    Email,
}

/// `1234567.4` -> `1,234,567`
pub fn thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn location_line(p: &AlertProperty) -> String {
    match &p.district {
        Some(d) if !d.is_empty() => format!("{} - {}", escape_html(&p.city), escape_html(d)),
        _ => escape_html(&p.city),
    }
}

fn price_text(price: Option<f64>) -> String {
    match price {
        Some(p) if p > 0.0 => thousands(p),
        _ => "N/A".to_string(),
    }
}

/// Discount below market, only when the listing is cheaper than average
fn discount(p: &AlertProperty) -> Option<f64> {
    p.price_vs_market_percent.filter(|v| *v < 0.0).map(f64::abs)
}

/// One property, rendered for Telegram (HTML parse mode) or email
pub fn property_message(p: &AlertProperty, channel: Channel) -> String {
    let emoji = p.deal_type.emoji();
    let title = escape_html(&p.title);
    let price = price_text(p.price);
    let mut out = String::new();

    match channel {
        Channel::Telegram => {
            let _ = writeln!(out, "{} <b>{}</b>\n", emoji, title);
            let _ = writeln!(out, "📍 <b>{}</b>", location_line(p));
            let _ = writeln!(out, "💰 <b>{} SAR</b>", price);
            if let Some(size) = p.size_sqm.filter(|s| *s > 0.0) {
                let _ = writeln!(out, "📐 {} m²", thousands(size));
            }
            if let Some(bedrooms) = p.bedrooms.filter(|b| *b > 0) {
                let _ = writeln!(out, "🛏 {} bedrooms", bedrooms);
            }
            if let Some(d) = discount(p) {
                let _ = writeln!(out, "📉 {}% below market", d);
            }
            if p.investment_score > 0 {
                let _ = writeln!(out, "⭐ Score: {}/100", p.investment_score);
            }
            if !p.source_url.is_empty() {
                let _ = write!(out, "\n🔗 <a href='{}'>View on Aqar</a>", escape_html(&p.source_url));
            }
        }
        Channel::Email => {
            let _ = writeln!(out, "<h2>{} {}</h2>", emoji, title);
            let _ = writeln!(out, "<p><strong>Location:</strong> {}</p>", location_line(p));
            let _ = writeln!(out, "<p><strong>Price:</strong> {} SAR</p>", price);
            if let Some(size) = p.size_sqm.filter(|s| *s > 0.0) {
                let _ = writeln!(out, "<p><strong>Size:</strong> {} m²</p>", thousands(size));
            }
            if let Some(bedrooms) = p.bedrooms.filter(|b| *b > 0) {
                let _ = writeln!(out, "<p><strong>Bedrooms:</strong> {}</p>", bedrooms);
            }
            if let Some(d) = discount(p) {
                let _ = writeln!(out, "<p><strong>Market Discount:</strong> {}%</p>", d);
            }
            if p.investment_score > 0 {
                let _ = writeln!(
                    out,
                    "<p><strong>Investment Score:</strong> {}/100</p>",
                    p.investment_score
                );
            }
            if !p.source_url.is_empty() {
                let _ = writeln!(
                    out,
                    "<p><a href='{}' style='background:#007bff;color:white;padding:10px 20px;text-decoration:none;border-radius:5px;'>View Property</a></p>",
                    escape_html(&p.source_url)
                );
            }
        }
    }

    out.trim().to_string()
}

pub fn alert_subject(p: &AlertProperty) -> String {
    format!("New Property Alert: {}", truncate_chars(&p.title, 50))
}

pub fn digest_subject(count: usize) -> String {
    format!("KingdomScout: {} New Deals Found!", count)
}

pub fn email_digest(properties: &[AlertProperty], site_url: &str) -> String {
    let mut parts = vec![
        "<h1>🏠 New Property Deals</h1>".to_string(),
        format!(
            "<p>We found <strong>{}</strong> new properties matching your criteria.</p>",
            properties.len()
        ),
        "<hr>".to_string(),
    ];
    for p in properties.iter().take(EMAIL_DIGEST_LIMIT) {
        parts.push(property_message(p, Channel::Email));
        parts.push("<hr>".to_string());
    }
    if properties.len() > EMAIL_DIGEST_LIMIT {
        parts.push(format!(
            "<p>...and {} more deals. <a href='{}/deals'>View all →</a></p>",
            properties.len() - EMAIL_DIGEST_LIMIT,
            site_url.trim_end_matches('/')
        ));
    }
    parts.join("\n")
}

pub fn telegram_digest(properties: &[AlertProperty]) -> String {
    let mut out = format!("🔔 <b>{} New Deals Found!</b>\n\n", properties.len());
    for p in properties.iter().take(TELEGRAM_DIGEST_LIMIT) {
        let _ = write!(
            out,
            "{} {}...\n💰 {} SAR\n\n",
            p.deal_type.emoji(),
            escape_html(&truncate_chars(&p.title, 40)),
            price_text(p.price)
        );
    }
    if properties.len() > TELEGRAM_DIGEST_LIMIT {
        let _ = write!(
            out,
            "...and {} more deals on the website!",
            properties.len() - TELEGRAM_DIGEST_LIMIT
        );
    }
    out
}

pub fn drop_percent(old_price: f64, new_price: f64) -> f64 {
    if old_price <= 0.0 {
        return 0.0;
    }
    (old_price - new_price) / old_price * 100.0
}

pub fn price_drop_subject(old_price: f64, new_price: f64) -> String {
    format!("📉 Price Drop Alert: {:.1}% off!", drop_percent(old_price, new_price))
}

pub fn price_drop_message(p: &AlertProperty, old_price: f64, new_price: f64, channel: Channel) -> String {
    let drop = drop_percent(old_price, new_price);
    match channel {
        Channel::Telegram => format!(
            "📉 <b>PRICE DROP!</b>\n\n{}\n\nOld price: {} SAR\nNew price: {} SAR\nDrop: {:.1}%\n\n{}",
            escape_html(&truncate_chars(&p.title, 60)),
            thousands(old_price),
            thousands(new_price),
            drop,
            p.source_url
        ),
        Channel::Email => format!(
            "<h2>📉 Price Drop Alert!</h2>\n<p><strong>{}</strong></p>\n<p>Old price: <s>{} SAR</s></p>\n<p>New price: <strong style='color:green;'>{} SAR</strong></p>\n<p>You save: <strong>{:.1}%</strong></p>\n<p><a href='{}'>View Property →</a></p>",
            escape_html(&p.title),
            thousands(old_price),
            thousands(new_price),
            drop,
            escape_html(&p.source_url)
        ),
    }
}

pub fn scrape_summary(reports: &[CityReport], completed_at: DateTime<Utc>) -> String {
    let total_found: usize = reports.iter().map(|r| r.found).sum();
    let total_errors: usize = reports.iter().map(|r| r.errors).sum();

    let mut out = format!(
        "📊 <b>Scrape Complete</b>\n\nCities scraped: {}\nTotal properties found: {}\nErrors: {}\nCompleted at: {}\n\nDetails:\n",
        reports.len(),
        total_found,
        total_errors,
        completed_at.format("%Y-%m-%d %H:%M UTC")
    );
    for r in reports {
        let emoji = if r.errors == 0 { "✅" } else { "⚠️" };
        let _ = writeln!(out, "{} {}: {} found", emoji, r.city_en, r.found);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DealType;
    use chrono::TimeZone;
    use uuid::Uuid;

    pub(crate) fn sample(title: &str, deal_type: DealType) -> AlertProperty {
        AlertProperty {
            id: Uuid::nil(),
            title: title.to_string(),
            price: Some(1_250_000.0),
            size_sqm: Some(312.0),
            bedrooms: Some(5),
            price_vs_market_percent: Some(-22.5),
            investment_score: 88,
            deal_type,
            city: "الرياض".to_string(),
            city_en: Some("Riyadh".to_string()),
            city_slug: Some("riyadh".to_string()),
            district: Some("الملقا".to_string()),
            property_type: Some("villa".to_string()),
            source_url: "https://sa.aqar.fm/villa-1".to_string(),
            main_image_url: None,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0.0), "0");
        assert_eq!(thousands(999.0), "999");
        assert_eq!(thousands(1000.0), "1,000");
        assert_eq!(thousands(1_234_567.4), "1,234,567");
        assert_eq!(thousands(-45_000.0), "-45,000");
    }

    #[test]
    fn telegram_message_lists_known_fields() {
        let msg = property_message(&sample("فيلا <فاخرة>", DealType::HotDeal), Channel::Telegram);
        assert!(msg.starts_with("🔥 <b>فيلا &lt;فاخرة&gt;</b>"));
        assert!(msg.contains("📍 <b>الرياض - الملقا</b>"));
        assert!(msg.contains("💰 <b>1,250,000 SAR</b>"));
        assert!(msg.contains("📐 312 m²"));
        assert!(msg.contains("🛏 5 bedrooms"));
        assert!(msg.contains("📉 22.5% below market"));
        assert!(msg.contains("⭐ Score: 88/100"));
        assert!(msg.ends_with("View on Aqar</a>"));
    }

    #[test]
    fn overpriced_listing_has_no_discount_line() {
        let mut p = sample("شقة", DealType::Overpriced);
        p.price_vs_market_percent = Some(12.0);
        p.bedrooms = None;
        p.price = None;
        let msg = property_message(&p, Channel::Email);
        assert!(msg.starts_with("<h2>🏠 شقة</h2>"));
        assert!(msg.contains("N/A SAR"));
        assert!(!msg.contains("Market Discount"));
        assert!(!msg.contains("Bedrooms"));
    }

    #[test]
    fn digests_are_capped() {
        let many: Vec<_> = (0..12).map(|i| sample(&format!("عقار {}", i), DealType::GoodDeal)).collect();

        let email = email_digest(&many, "https://propertyscout.sa/");
        assert_eq!(email.matches("<h2>").count(), EMAIL_DIGEST_LIMIT);
        assert!(email.contains("...and 2 more deals. <a href='https://propertyscout.sa/deals'>"));

        let telegram = telegram_digest(&many);
        assert!(telegram.starts_with("🔔 <b>12 New Deals Found!</b>"));
        assert_eq!(telegram.matches("💰").count(), TELEGRAM_DIGEST_LIMIT);
        assert!(telegram.ends_with("...and 7 more deals on the website!"));
    }

    #[test]
    fn price_drop_wording() {
        let p = sample("فيلا", DealType::GoodDeal);
        assert_eq!(price_drop_subject(1_000_000.0, 900_000.0), "📉 Price Drop Alert: 10.0% off!");
        let msg = price_drop_message(&p, 1_000_000.0, 900_000.0, Channel::Telegram);
        assert!(msg.contains("Old price: 1,000,000 SAR\nNew price: 900,000 SAR\nDrop: 10.0%"));
        assert_eq!(drop_percent(0.0, 10.0), 0.0);
    }

    #[test]
    fn summary_marks_cities_with_errors() {
        let reports = vec![
            CityReport {
                city: "الرياض".to_string(),
                city_en: "Riyadh".to_string(),
                found: 40,
                ..CityReport::default()
            },
            CityReport {
                city: "جدة".to_string(),
                city_en: "Jeddah".to_string(),
                found: 3,
                errors: 2,
                ..CityReport::default()
            },
        ];
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap();
        let text = scrape_summary(&reports, at);
        assert!(text.contains("Cities scraped: 2\nTotal properties found: 43\nErrors: 2"));
        assert!(text.contains("Completed at: 2026-10-15 09:30 UTC"));
        assert!(text.contains("✅ Riyadh: 40 found"));
        assert!(text.contains("⚠️ Jeddah: 3 found"));
    }
}
