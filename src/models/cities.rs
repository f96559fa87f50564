use serde::Serialize;

/// A Saudi city the scraper knows how to crawl
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CityInfo {
    /// Name as it appears in listing-site URLs
    pub name_ar: &'static str,
    pub name_en: &'static str,
    pub slug: &'static str,
    pub region: &'static str,
    /// Crawl order, lowest first
    pub priority: u32,
}

const fn city(
    name_ar: &'static str,
    name_en: &'static str,
    slug: &'static str,
    region: &'static str,
    priority: u32,
) -> CityInfo {
    CityInfo {
        name_ar,
        name_en,
        slug,
        region,
        priority,
    }
}

pub const SAUDI_CITIES: [CityInfo; 20] = [
    city("الرياض", "Riyadh", "riyadh", "Riyadh Region", 1),
    city("جدة", "Jeddah", "jeddah", "Makkah Region", 2),
    city("مكة", "Makkah", "makkah", "Makkah Region", 3),
    city("المدينة", "Madinah", "madinah", "Madinah Region", 4),
    city("الدمام", "Dammam", "dammam", "Eastern Province", 5),
    city("الخبر", "Khobar", "khobar", "Eastern Province", 6),
    city("تبوك", "Tabuk", "tabuk", "Tabuk Region", 7),
    city("بريدة", "Buraidah", "buraidah", "Qassim Region", 8),
    city("طائف", "Taif", "taif", "Makkah Region", 9),
    city("أبها", "Abha", "abha", "Asir Region", 10),
    city("نجران", "Najran", "najran", "Najran Region", 11),
    city("حائل", "Hail", "hail", "Hail Region", 12),
    city("الجبيل", "Jubail", "jubail", "Eastern Province", 13),
    city("القطيف", "Qatif", "qatif", "Eastern Province", 14),
    city("خميس-مشيط", "Khamis Mushait", "khamis-mushait", "Asir Region", 15),
    city("ينبع", "Yanbu", "yanbu", "Madinah Region", 16),
    city("الظهران", "Dhahran", "dhahran", "Eastern Province", 17),
    city("الأحساء", "Al Ahsa", "al-ahsa", "Eastern Province", 18),
    city("جازان", "Jazan", "jazan", "Jazan Region", 19),
    city("الباحة", "Al Baha", "al-baha", "Al Baha Region", 20),
];

/// Look a city up by its Arabic name, English name or slug.
pub fn find_city(name: &str) -> Option<&'static CityInfo> {
    let name = name.trim();
    SAUDI_CITIES.iter().find(|c| {
        c.name_ar == name || c.slug == name || c.name_en.eq_ignore_ascii_case(name)
    })
}
