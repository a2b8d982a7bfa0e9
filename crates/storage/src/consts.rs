use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Six comma-separated octets anywhere in a `227` reply; the last two are the port.
regex!(PASV_ADDRESS_REGEX, r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})");
// Apache, nginx, lighttpd and IIS all title their autoindex pages like this.
regex!(INDEX_TITLE_REGEX, r"(?i)^\s*index of\b");
selector!(TITLE_SELECTOR, "title");
selector!(ANCHOR_SELECTOR, "a[href]");
