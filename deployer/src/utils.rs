//! Utility functions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Version information for the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Backoff options for bounded retries
#[derive(Debug, Clone)]
pub struct BackoffOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 1.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &BackoffOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// ASCII spelling of common accented Latin letters, lowercased
fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c.to_lowercase().next().unwrap_or(c) {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' => "s",
        'ß' => "ss",
        'ţ' | 'ť' | 'ŧ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

/// Lowercase ASCII slug. Accented Latin letters are folded to ASCII, `@`
/// becomes `at`, and every other run of characters collapses to `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        let mut buf = [0u8; 4];
        let word = if c.is_ascii_alphanumeric() {
            &*c.to_ascii_lowercase().encode_utf8(&mut buf)
        } else if c == '@' {
            pending_dash = true;
            "at"
        } else if let Some(folded) = fold_latin(c) {
            folded
        } else {
            pending_dash = true;
            continue;
        };

        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(word);
        pending_dash = c == '@';
    }

    slug
}

/// Stable served directory name for a project, e.g. `www.my-site`
pub fn deployment_path_for(project_name: &str) -> String {
    let slug = slugify(project_name);
    if slug.is_empty() {
        "www.site".to_string()
    } else {
        format!("www.{}", slug)
    }
}
