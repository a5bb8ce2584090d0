use serde::{Deserialize, Serialize};

/// Site locales. Unknown values fall back to English.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("zh") => Self::Zh,
            _ => Self::En,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

/// A bookable treatment package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Package {
    pub key: &'static str,
    pub label_en: &'static str,
    pub label_zh: &'static str,
    pub amount_cents: u64,
}

impl Package {
    pub fn label(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => self.label_en,
            Locale::Zh => self.label_zh,
        }
    }
}

pub const CHECKOUT_CURRENCY: &str = "usd";

pub static PACKAGES: [Package; 3] = [
    Package {
        key: "single",
        label_en: "Single Implant \u{2014} 3-Week All-Inclusive Package",
        label_zh: "单颗种植牙 · 3周全包套餐",
        amount_cents: 780_000,
    },
    Package {
        key: "half-mouth",
        label_en: "Half-Mouth All-on-4 \u{2014} 3-Week All-Inclusive Package",
        label_zh: "半口 All-on-4 · 3周全包套餐",
        amount_cents: 1_680_000,
    },
    Package {
        key: "full-mouth",
        label_en: "Full-Mouth All-on-4 \u{2014} 3-Week All-Inclusive Package",
        label_zh: "全口 All-on-4 · 3周全包套餐",
        amount_cents: 2_480_000,
    },
];

pub fn find_package(key: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|p| p.key == key)
}

/// Shareable landing link carrying a referral code.
pub fn referral_link(base_url: &str, locale: Locale, code: &str) -> String {
    format!("{}/{}?ref={}", base_url.trim_end_matches('/'), locale.as_str(), code)
}
