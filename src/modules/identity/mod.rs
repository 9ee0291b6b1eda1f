//! Synthetic browser identity generation.
//!
//! Produces one internally-consistent fingerprint per session: user agent,
//! screen, timezone, locale, canvas/WebGL hashes, fonts, and plugins. Every
//! browser-derived field is computed from the chosen user agent so a profile
//! can never contradict itself.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;

/// Real desktop and mobile user agents the generator draws from.
const USER_AGENTS: &[&str] = &[
    // Windows Chrome
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    // Windows Firefox
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:119.0) Gecko/20100101 Firefox/119.0",
    // Windows Edge
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    // MacOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    // Mobile
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
];

struct TimezoneEntry {
    zone: &'static str,
    offset_hours: f32,
    country: &'static str,
    city: &'static str,
}

const TIMEZONES: &[TimezoneEntry] = &[
    TimezoneEntry { zone: "America/New_York", offset_hours: -5.0, country: "US", city: "New York" },
    TimezoneEntry { zone: "America/Los_Angeles", offset_hours: -8.0, country: "US", city: "Los Angeles" },
    TimezoneEntry { zone: "America/Chicago", offset_hours: -6.0, country: "US", city: "Chicago" },
    TimezoneEntry { zone: "Europe/London", offset_hours: 0.0, country: "GB", city: "London" },
    TimezoneEntry { zone: "Europe/Paris", offset_hours: 1.0, country: "FR", city: "Paris" },
    TimezoneEntry { zone: "Europe/Berlin", offset_hours: 1.0, country: "DE", city: "Berlin" },
    TimezoneEntry { zone: "Asia/Tokyo", offset_hours: 9.0, country: "JP", city: "Tokyo" },
    TimezoneEntry { zone: "Asia/Shanghai", offset_hours: 8.0, country: "CN", city: "Shanghai" },
    TimezoneEntry { zone: "Asia/Seoul", offset_hours: 9.0, country: "KR", city: "Seoul" },
    TimezoneEntry { zone: "Asia/Singapore", offset_hours: 8.0, country: "SG", city: "Singapore" },
    TimezoneEntry { zone: "Asia/Jakarta", offset_hours: 7.0, country: "ID", city: "Jakarta" },
    TimezoneEntry { zone: "Australia/Sydney", offset_hours: 10.0, country: "AU", city: "Sydney" },
    TimezoneEntry { zone: "America/Sao_Paulo", offset_hours: -3.0, country: "BR", city: "São Paulo" },
    TimezoneEntry { zone: "Asia/Kolkata", offset_hours: 5.5, country: "IN", city: "Mumbai" },
];

const SCREEN_RESOLUTIONS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
    (2560, 1440),
    (3840, 2160),
    (1600, 900),
    (1280, 1024),
    (1024, 768),
];

const FONTS: &[&str] = &[
    "Arial", "Times New Roman", "Helvetica", "Georgia", "Verdana",
    "Tahoma", "Trebuchet MS", "Arial Black", "Impact", "Comic Sans MS",
    "Palatino Linotype", "Lucida Sans Unicode", "MS Sans Serif",
    "Courier New", "Lucida Console",
];

// Private-range prefixes a home or office client would actually hold.
const LOCAL_IP_PREFIXES: &[&str] = &["192.168.1", "192.168.0", "10.0.0", "172.16.0"];

const STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

const WEBGL_VENDORS: &[&str] = &["Google Inc.", "Mozilla", "WebKit"];

const WEBGL_RENDERERS: &[&str] = &[
    "ANGLE (Intel(R) HD Graphics Direct3D11 vs_5_0 ps_5_0)",
    "ANGLE (NVIDIA GeForce GTX 1060 Direct3D11 vs_5_0 ps_5_0)",
    "WebKit WebGL",
];

static FIREFOX_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Firefox/(\d+\.\d+)").expect("firefox pattern"));
static SAFARI_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Version/(\d+\.\d+)").expect("safari pattern"));
static EDGE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Edg/(\d+\.\d+\.\d+\.\d+)").expect("edge pattern"));
static CHROME_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Chrome/(\d+\.\d+\.\d+\.\d+)").expect("chrome pattern"));

/// Browser family, derived from the user agent and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

impl BrowserFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Safari => "Safari",
            BrowserFamily::Edge => "Edge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
}

impl Os {
    /// Value presented in the `Sec-Ch-Ua-Platform` client hint.
    pub fn platform_label(self) -> &'static str {
        match self {
            Os::Windows => "Windows",
            Os::MacOs => "macOS",
            Os::Linux => "Linux",
            Os::Android => "Android",
            Os::Ios => "iOS",
        }
    }
}

/// Browser name/version/os triple, all derived from one user agent.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserInfo {
    pub family: BrowserFamily,
    pub version: String,
    pub os: Os,
}

/// Total derivation over the fixed catalogue. Edge must be checked before
/// Chrome (its UA contains both tokens); Safari requires absence of Chrome.
pub fn derive_browser_info(user_agent: &str) -> BrowserInfo {
    let (family, version) = if user_agent.contains("Edg/") {
        let version = EDGE_VERSION
            .captures(user_agent)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "120.0.0.0".to_string());
        (BrowserFamily::Edge, version)
    } else if user_agent.contains("Firefox") {
        let version = FIREFOX_VERSION
            .captures(user_agent)
            .map(|c| format!("{}.0", &c[1]))
            .unwrap_or_else(|| "120.0".to_string());
        (BrowserFamily::Firefox, version)
    } else if user_agent.contains("Safari") && !user_agent.contains("Chrome") {
        let version = SAFARI_VERSION
            .captures(user_agent)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "17.1".to_string());
        (BrowserFamily::Safari, version)
    } else {
        let version = CHROME_VERSION
            .captures(user_agent)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "120.0.0.0".to_string());
        (BrowserFamily::Chrome, version)
    };

    let os = if user_agent.contains("iPhone") {
        Os::Ios
    } else if user_agent.contains("Android") {
        Os::Android
    } else if user_agent.contains("Mac OS X") {
        Os::MacOs
    } else if user_agent.contains("Linux") {
        Os::Linux
    } else {
        Os::Windows
    };

    BrowserInfo { family, version, os }
}

/// Plugin list implied by the browser family.
pub fn plugins_for(family: BrowserFamily) -> Vec<&'static str> {
    match family {
        BrowserFamily::Chrome | BrowserFamily::Edge => vec![
            "Chrome PDF Plugin",
            "Native Client",
            "Widevine Content Decryption Module",
        ],
        BrowserFamily::Firefox => vec!["PDF.js", "OpenH264 Video Codec"],
        BrowserFamily::Safari => Vec::new(),
    }
}

/// Accept-Language list implied by the timezone's country.
pub fn languages_for(country: &str) -> Vec<&'static str> {
    match country {
        "US" => vec!["en-US", "en"],
        "GB" => vec!["en-GB", "en"],
        "DE" => vec!["de-DE", "de", "en"],
        "FR" => vec!["fr-FR", "fr", "en"],
        "JP" => vec!["ja-JP", "ja", "en"],
        "CN" => vec!["zh-CN", "zh", "en"],
        "KR" => vec!["ko-KR", "ko", "en"],
        "ID" => vec!["id-ID", "id", "en"],
        "BR" => vec!["pt-BR", "pt", "en"],
        "IN" => vec!["hi-IN", "en-IN", "en"],
        _ => vec!["en-US", "en"],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimezoneInfo {
    pub zone: String,
    pub offset_hours: f32,
    pub country: String,
    pub city: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanvasFingerprint {
    pub hash: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}

/// What a WebRTC ICE probe would leak for this profile. The public address
/// is whatever the proxy presents, so only the local side is synthesized.
#[derive(Debug, Clone, Serialize)]
pub struct WebRtcFingerprint {
    pub local_ip: String,
    pub stun_servers: Vec<&'static str>,
}

/// One coherent synthetic client fingerprint. Replaced wholesale on rotation,
/// never partially mutated.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityProfile {
    pub session_id: String,
    pub user_agent: String,
    pub browser: BrowserInfo,
    pub screen: ScreenInfo,
    pub timezone: TimezoneInfo,
    pub location: GeoPoint,
    pub languages: Vec<&'static str>,
    pub canvas: CanvasFingerprint,
    pub webrtc: WebRtcFingerprint,
    pub fonts: Vec<&'static str>,
    pub plugins: Vec<&'static str>,
    pub do_not_track: bool,
    pub created_at: DateTime<Utc>,
}

impl IdentityProfile {
    /// Baseline navigation headers presented on every stealth request.
    pub fn to_http_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, "user-agent", &self.user_agent);
        insert(&mut headers, "accept-language", &self.languages.join(","));
        insert(
            &mut headers,
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        );
        insert(&mut headers, "accept-encoding", "gzip, deflate, br");
        insert(&mut headers, "dnt", if self.do_not_track { "1" } else { "0" });
        insert(&mut headers, "connection", "keep-alive");
        insert(&mut headers, "upgrade-insecure-requests", "1");
        insert(&mut headers, "sec-fetch-dest", "document");
        insert(&mut headers, "sec-fetch-mode", "navigate");
        insert(&mut headers, "sec-fetch-site", "none");
        insert(&mut headers, "cache-control", "max-age=0");
        headers
    }

    /// `Sec-Ch-Ua` value consistent with the derived browser family.
    pub fn sec_ch_ua(&self) -> String {
        let major = self.browser.version.split('.').next().unwrap_or("120");
        match self.browser.family {
            BrowserFamily::Chrome => format!(
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\""
            ),
            BrowserFamily::Edge => format!(
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{major}\", \"Microsoft Edge\";v=\"{major}\""
            ),
            BrowserFamily::Firefox => format!("\"Firefox\";v=\"{major}\""),
            BrowserFamily::Safari => "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\"".to_string(),
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self.browser.os, Os::Android | Os::Ios)
    }

    /// Subset relevant for behavioral logging and telemetry.
    pub fn to_fingerprint(&self) -> FingerprintSummary {
        FingerprintSummary {
            user_agent: self.user_agent.clone(),
            screen: self.screen,
            timezone: self.timezone.zone.clone(),
            language: self.languages.first().copied().unwrap_or("en-US"),
            canvas_hash: self.canvas.hash.clone(),
            webrtc_local_ip: self.webrtc.local_ip.clone(),
            webgl_vendor: self.canvas.webgl_vendor.clone(),
            webgl_renderer: self.canvas.webgl_renderer.clone(),
            font_count: self.fonts.len(),
            plugin_count: self.plugins.len(),
            do_not_track: self.do_not_track,
        }
    }
}

/// Telemetry view of a profile.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintSummary {
    pub user_agent: String,
    pub screen: ScreenInfo,
    pub timezone: String,
    pub language: &'static str,
    pub canvas_hash: String,
    pub webrtc_local_ip: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub font_count: usize,
    pub plugin_count: usize,
    pub do_not_track: bool,
}

/// Draws coherent profiles from the fixed catalogues. Seedable so tests can
/// pin the random choices.
#[derive(Debug)]
pub struct IdentityGenerator {
    rng: StdRng,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self) -> IdentityProfile {
        let user_agent = (*USER_AGENTS.choose(&mut self.rng).expect("catalogue")).to_string();
        let tz = TIMEZONES.choose(&mut self.rng).expect("catalogue");
        let (width, height) = *SCREEN_RESOLUTIONS.choose(&mut self.rng).expect("catalogue");

        let browser = derive_browser_info(&user_agent);
        let session_id = self.session_id();
        let created_at = Utc::now();

        let font_count = self.rng.gen_range(8..=12);
        let fonts: Vec<&'static str> = FONTS
            .choose_multiple(&mut self.rng, font_count)
            .copied()
            .collect();

        let salt: u64 = self.rng.r#gen();
        let canvas = CanvasFingerprint {
            hash: canvas_hash(&session_id, created_at, salt),
            webgl_vendor: (*WEBGL_VENDORS.choose(&mut self.rng).expect("catalogue")).to_string(),
            webgl_renderer: (*WEBGL_RENDERERS.choose(&mut self.rng).expect("catalogue"))
                .to_string(),
        };
        let webrtc = WebRtcFingerprint {
            local_ip: self.local_ip(),
            stun_servers: STUN_SERVERS.to_vec(),
        };

        IdentityProfile {
            languages: languages_for(tz.country),
            plugins: plugins_for(browser.family),
            timezone: TimezoneInfo {
                zone: tz.zone.to_string(),
                offset_hours: tz.offset_hours,
                country: tz.country.to_string(),
                city: tz.city.to_string(),
            },
            location: GeoPoint {
                latitude: self.rng.gen_range(-90.0..90.0),
                longitude: self.rng.gen_range(-180.0..180.0),
            },
            screen: ScreenInfo { width, height },
            do_not_track: self.rng.gen_bool(0.3),
            session_id,
            user_agent,
            browser,
            canvas,
            webrtc,
            fonts,
            created_at,
        }
    }

    fn local_ip(&mut self) -> String {
        let prefix = LOCAL_IP_PREFIXES.choose(&mut self.rng).expect("catalogue");
        format!("{prefix}.{}", self.rng.gen_range(1..=254))
    }

    fn session_id(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable 16-hex-char hash for the profile's lifetime. Uniqueness matters
/// here, not cryptographic strength.
fn canvas_hash(session_id: &str, created_at: DateTime<Utc>, salt: u64) -> String {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    created_at.timestamp_millis().hash(&mut hasher);
    salt.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::from_static(name);
    let value =
        HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    headers.insert(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_is_detected_before_chrome() {
        let info = derive_browser_info(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
        );
        assert_eq!(info.family, BrowserFamily::Edge);
        assert_eq!(info.os, Os::Windows);
    }

    #[test]
    fn safari_requires_absence_of_chrome() {
        let info = derive_browser_info(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(info.family, BrowserFamily::Chrome);
        assert_eq!(info.os, Os::MacOs);

        let info = derive_browser_info(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        );
        assert_eq!(info.family, BrowserFamily::Safari);
        assert_eq!(info.version, "17.1");
    }

    #[test]
    fn profile_is_internally_consistent() {
        let mut generator = IdentityGenerator::with_seed(42);
        for _ in 0..50 {
            let profile = generator.generate();
            let rederived = derive_browser_info(&profile.user_agent);
            assert_eq!(profile.browser.family, rederived.family);
            assert_eq!(profile.plugins, plugins_for(profile.browser.family));

            // A Firefox profile must never carry Chrome-only plugin entries.
            if profile.browser.family == BrowserFamily::Firefox {
                assert!(!profile
                    .plugins
                    .iter()
                    .any(|p| p.contains("Widevine") || p.contains("Native Client")));
                assert!(profile.sec_ch_ua().starts_with("\"Firefox\""));
            }

            assert!(profile.fonts.len() >= 8 && profile.fonts.len() <= 12);
            assert_eq!(profile.canvas.hash.len(), 16);
            assert!(!profile.languages.is_empty());
        }
    }

    #[test]
    fn headers_reflect_profile() {
        let mut generator = IdentityGenerator::with_seed(7);
        let profile = generator.generate();
        let headers = profile.to_http_headers();
        assert_eq!(
            headers.get("user-agent").unwrap().to_str().unwrap(),
            profile.user_agent
        );
        assert_eq!(
            headers.get("accept-language").unwrap().to_str().unwrap(),
            profile.languages.join(",")
        );
        assert!(headers.contains_key("sec-fetch-mode"));
    }

    #[test]
    fn webrtc_leak_stays_in_private_ranges() {
        let mut generator = IdentityGenerator::with_seed(21);
        for _ in 0..50 {
            let profile = generator.generate();
            let ip = &profile.webrtc.local_ip;
            assert!(
                ip.starts_with("192.168.1.")
                    || ip.starts_with("192.168.0.")
                    || ip.starts_with("10.0.0.")
                    || ip.starts_with("172.16.0."),
                "unexpected local ip {ip}"
            );
            let last: u32 = ip.rsplit('.').next().unwrap().parse().unwrap();
            assert!((1..=254).contains(&last));
            assert!(!profile.webrtc.stun_servers.is_empty());
            assert_eq!(profile.to_fingerprint().webrtc_local_ip, *ip);
        }
    }

    #[test]
    fn unmapped_country_defaults_to_english() {
        assert_eq!(languages_for("ZZ"), vec!["en-US", "en"]);
    }

    #[test]
    fn distinct_profiles_get_distinct_canvas_hashes() {
        let mut generator = IdentityGenerator::with_seed(3);
        let a = generator.generate();
        let b = generator.generate();
        assert_ne!(a.canvas.hash, b.canvas.hash);
        assert_ne!(a.session_id, b.session_id);
    }
}
