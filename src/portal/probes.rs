//! OS captive-portal detection endpoints.

/// A connectivity probe some client OS issues after joining a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Android,
    Apple,
    Windows,
    Firefox,
}

impl Probe {
    /// What the OS expects to see when there is no portal.
    ///
    /// Served when the AP is down, so clients on the station network do not
    /// get redirected.
    pub fn online_response(self, path: &str) -> (u16, &'static str) {
        match self {
            Self::Android => (204, ""),
            Self::Apple => (
                200,
                "<HTML><HEAD><TITLE>Success</TITLE></HEAD><BODY>Success</BODY></HTML>",
            ),
            Self::Windows if path == "/connecttest.txt" => (200, "Microsoft Connect Test"),
            Self::Windows => (200, "Microsoft NCSI"),
            Self::Firefox => (200, "success\n"),
        }
    }
}

/// Match a request path against the known probe URLs.
pub fn classify_probe(path: &str) -> Option<Probe> {
    match path {
        "/generate_204" | "/gen_204" => Some(Probe::Android),
        "/hotspot-detect.html" | "/library/test/success.html" => Some(Probe::Apple),
        "/ncsi.txt" | "/connecttest.txt" => Some(Probe::Windows),
        "/success.txt" | "/canonical.html" => Some(Probe::Firefox),
        _ => None,
    }
}
