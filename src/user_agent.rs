//! Small `User-Agent` parser: browser, operating system and device class.

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgent {
    /// Browser (or bot) name.
    pub name: String,
    pub version: String,
    pub os: String,
    pub os_version: String,
    pub device: String,
    pub mobile: bool,
    pub tablet: bool,
    pub desktop: bool,
    pub bot: bool,
}

lazy_static! {
    static ref BOT_RE: Regex =
        Regex::new(r"(?i)(bot|crawler|spider|slurp|crawling|facebookexternalhit|curl/|wget/|python-requests|headless)")
            .unwrap();
    static ref NAMED_BOT_RE: Regex =
        Regex::new(r"(?i)(Googlebot|bingbot|YandexBot|DuckDuckBot|Baiduspider|Applebot|AhrefsBot|SemrushBot|facebookexternalhit|Twitterbot)/?([\d.]*)")
            .unwrap();
    static ref WINDOWS_RE: Regex = Regex::new(r"Windows NT (\d+\.\d+)").unwrap();
    static ref IOS_RE: Regex = Regex::new(r"(?:CPU (?:iPhone )?OS|iPhone OS) (\d+(?:_\d+)*)").unwrap();
    static ref MACOS_RE: Regex = Regex::new(r"Mac OS X (\d+(?:[_.]\d+)*)").unwrap();
    static ref ANDROID_RE: Regex = Regex::new(r"Android (\d+(?:\.\d+)*)(?:; ([^;)]+))?").unwrap();
    static ref CHROMEOS_RE: Regex = Regex::new(r"CrOS \S+ (\d+(?:\.\d+)*)").unwrap();
    static ref BROWSER_RES: Vec<(&'static str, Regex)> = vec![
        ("Edge", Regex::new(r"Edg(?:e|A|iOS)?/([\d.]+)").unwrap()),
        ("Opera", Regex::new(r"(?:OPR|Opera)/([\d.]+)").unwrap()),
        ("Samsung Browser", Regex::new(r"SamsungBrowser/([\d.]+)").unwrap()),
        ("Firefox", Regex::new(r"(?:Firefox|FxiOS)/([\d.]+)").unwrap()),
        ("Chrome", Regex::new(r"(?:Chrome|CriOS)/([\d.]+)").unwrap()),
        ("Internet Explorer", Regex::new(r"(?:MSIE |Trident/.*rv:)([\d.]+)").unwrap()),
        ("Safari", Regex::new(r"Version/([\d.]+).*Safari/").unwrap()),
    ];
}

fn windows_version(nt: &str) -> &str {
    match nt {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" | "5.2" => "XP",
        other => other,
    }
}

impl UserAgent {
    pub fn parse(ua: &str) -> Self {
        let mut parsed = UserAgent::default();
        let ua = ua.trim();
        if ua.is_empty() {
            return parsed;
        }

        parsed.detect_os(ua);
        parsed.detect_browser(ua);

        if let Some(caps) = NAMED_BOT_RE.captures(ua) {
            parsed.bot = true;
            parsed.name = caps[1].to_string();
            parsed.version = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        } else if BOT_RE.is_match(ua) {
            parsed.bot = true;
        }

        parsed.desktop = !parsed.mobile
            && !parsed.tablet
            && matches!(parsed.os.as_str(), "Windows" | "macOS" | "Linux" | "ChromeOS");
        parsed
    }

    fn detect_os(&mut self, ua: &str) {
        if ua.contains("iPad") {
            self.os = "iOS".into();
            self.device = "iPad".into();
            self.tablet = true;
            if let Some(caps) = IOS_RE.captures(ua) {
                self.os_version = caps[1].replace('_', ".");
            }
        } else if ua.contains("iPhone") || ua.contains("iPod") {
            self.os = "iOS".into();
            self.device = if ua.contains("iPod") { "iPod" } else { "iPhone" }.into();
            self.mobile = true;
            if let Some(caps) = IOS_RE.captures(ua) {
                self.os_version = caps[1].replace('_', ".");
            }
        } else if let Some(caps) = ANDROID_RE.captures(ua) {
            self.os = "Android".into();
            self.os_version = caps[1].to_string();
            if let Some(model) = caps.get(2) {
                let model = model.as_str().trim();
                let model = model.split(" Build/").next().unwrap_or(model);
                if model != "K" && !model.starts_with("wv") {
                    self.device = model.to_string();
                }
            }
            // Android tablets omit the "Mobile" token.
            if ua.contains("Mobile") {
                self.mobile = true;
            } else {
                self.tablet = true;
            }
        } else if let Some(caps) = WINDOWS_RE.captures(ua) {
            self.os = "Windows".into();
            self.os_version = windows_version(&caps[1]).to_string();
            if ua.contains("Windows Phone") {
                self.os = "Windows Phone".into();
                self.mobile = true;
            }
        } else if let Some(caps) = MACOS_RE.captures(ua) {
            self.os = "macOS".into();
            self.os_version = caps[1].replace('_', ".");
        } else if let Some(caps) = CHROMEOS_RE.captures(ua) {
            self.os = "ChromeOS".into();
            self.os_version = caps[1].to_string();
        } else if ua.contains("Linux") || ua.contains("X11") {
            self.os = "Linux".into();
        }
    }

    fn detect_browser(&mut self, ua: &str) {
        for (name, re) in BROWSER_RES.iter() {
            if let Some(caps) = re.captures(ua) {
                self.name = name.to_string();
                self.version = caps[1].to_string();
                return;
            }
        }
    }

    /// Device class with precedence `mobile < tablet < desktop < bot`, later flags winning.
    pub fn device_type(&self) -> &'static str {
        let mut device_type = "";
        if self.mobile {
            device_type = "mobile";
        }
        if self.tablet {
            device_type = "tablet";
        }
        if self.desktop {
            device_type = "desktop";
        }
        if self.bot {
            device_type = "bot";
        }
        device_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_on_windows() {
        let ua = UserAgent::parse(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(ua.name, "Chrome");
        assert_eq!(ua.version, "120.0.0.0");
        assert_eq!(ua.os, "Windows");
        assert_eq!(ua.os_version, "10");
        assert_eq!(ua.device_type(), "desktop");
    }

    #[test]
    fn safari_on_iphone() {
        let ua = UserAgent::parse(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1.2 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(ua.name, "Safari");
        assert_eq!(ua.version, "17.1.2");
        assert_eq!(ua.os, "iOS");
        assert_eq!(ua.os_version, "17.1.2");
        assert_eq!(ua.device, "iPhone");
        assert_eq!(ua.device_type(), "mobile");
    }

    #[test]
    fn firefox_on_macos() {
        let ua = UserAgent::parse(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
        );
        assert_eq!(ua.name, "Firefox");
        assert_eq!(ua.os, "macOS");
        assert_eq!(ua.os_version, "10.15");
        assert_eq!(ua.device_type(), "desktop");
    }

    #[test]
    fn android_tablet_and_phone() {
        let tablet = UserAgent::parse(
            "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(tablet.os, "Android");
        assert_eq!(tablet.device, "SM-X700");
        assert_eq!(tablet.device_type(), "tablet");

        let phone = UserAgent::parse(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        );
        assert_eq!(phone.os_version, "14");
        assert_eq!(phone.device, "Pixel 8");
        assert_eq!(phone.device_type(), "mobile");
    }

    #[test]
    fn edge_is_not_reported_as_chrome() {
        let ua = UserAgent::parse(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91",
        );
        assert_eq!(ua.name, "Edge");
        assert_eq!(ua.version, "120.0.2210.91");
    }

    #[test]
    fn bots_win_over_desktop() {
        let ua = UserAgent::parse(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
        );
        assert!(ua.bot);
        assert_eq!(ua.name, "Googlebot");
        assert_eq!(ua.version, "2.1");
        assert_eq!(ua.device_type(), "bot");

        let headless = UserAgent::parse(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36",
        );
        assert!(headless.desktop);
        assert!(headless.bot);
        assert_eq!(headless.device_type(), "bot");
    }

    #[test]
    fn precedence_is_last_flag_wins() {
        let ua = UserAgent {
            mobile: true,
            tablet: true,
            ..Default::default()
        };
        assert_eq!(ua.device_type(), "tablet");

        let ua = UserAgent {
            mobile: true,
            desktop: true,
            ..Default::default()
        };
        assert_eq!(ua.device_type(), "desktop");
    }

    #[test]
    fn empty_user_agent_is_blank() {
        let ua = UserAgent::parse("");
        assert_eq!(ua, UserAgent::default());
        assert_eq!(ua.device_type(), "");
    }
}
