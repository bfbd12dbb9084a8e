/*
Simple i18n helper for API error messages.

This module provides:
- A tiny embedded translations store for JA/EN (compile-time embedded JSON).
- A simple `tr` function to lookup translations by key + optional params.
- `negotiate` to pick a supported language from an `Accept-Language` header.

Usage:
    use crate::i18n;
    let msg = i18n::tr(None, "share.not_found", None);
    let params = [("min", "1"), ("max", "1440")];
    let msg_en = i18n::tr(Some("en"), "share.invalid_duration", Some(&params));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `ja`. If a key is missing for the requested language,
  the fallback language will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "ja";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const JA_JSON: &str = r#"
{
  "share.not_found": "シェアが見つかりません",
  "share.inactive": "シェアは停止されています",
  "share.expired": "シェアの有効期限が切れています",
  "share.invalid_id": "シェアIDの形式が正しくありません",
  "share.invalid_duration": "共有時間は{min}〜{max}分で指定してください",
  "share.not_found_or_unauthorized": "シェアが見つからないか、権限がありません",
  "share.none_active": "有効なシェアがありません",
  "location.not_found": "位置情報が見つかりません",
  "auth.email_taken": "このメールアドレスは既に登録されています",
  "auth.invalid_credentials": "メールアドレスまたはパスワードが正しくありません",
  "auth.invalid_email": "メールアドレスの形式が正しくありません",
  "auth.email_unverified": "Googleアカウントのメールアドレスが確認されていません",
  "auth.invalid_password": "パスワードは{min}〜{max}文字で指定してください"
}
"#;

const EN_JSON: &str = r#"
{
  "share.not_found": "Share not found",
  "share.inactive": "Share is not active",
  "share.expired": "Share expired",
  "share.invalid_id": "Invalid share id",
  "share.invalid_duration": "Sharing duration must be between {min} and {max} minutes",
  "share.not_found_or_unauthorized": "Share not found or unauthorized",
  "share.none_active": "No active share",
  "location.not_found": "Location not found",
  "auth.email_taken": "This e-mail address is already registered",
  "auth.invalid_credentials": "Invalid e-mail or password",
  "auth.invalid_email": "Invalid e-mail address",
  "auth.email_unverified": "Google account e-mail is not verified",
  "auth.invalid_password": "Password must be {min} to {max} characters long"
}
"#;

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    let ja_map: HashMap<String, String> = serde_json::from_str(JA_JSON).unwrap_or_else(|e| {
        panic!("failed to parse JA_JSON in i18n module: {}", e);
    });
    out.insert("ja".to_string(), ja_map);

    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).trim().to_lowercase()
}

/// Returns true if the given language code has a translation table.
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Pick the highest-weighted supported language from an `Accept-Language`
/// header value, e.g. `"fr-CH, en;q=0.8, ja;q=0.9"` -> `"ja"`.
pub fn negotiate(accept_language: &str) -> Option<String> {
    let mut candidates: Vec<(String, f32)> = accept_language
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = normalize_language(pieces.next()?);
            let q = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((tag, q))
        })
        .filter(|(tag, q)| *q > 0.0 && is_supported_language(tag))
        .collect();

    // Stable sort keeps header order for equal weights.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().next().map(|(tag, _)| tag)
}

/// Translate a key using an explicit language (or default if None).
///
/// Returns the translated and parameter-substituted string. If no translation is found,
/// returns the default language value or the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        .unwrap_or_else(|| key.to_string());

    if let Some(params) = params {
        let mut s = val;
        for (k, v) in params {
            s = s.replace(&format!("{{{}}}", k), v);
        }
        s
    } else {
        val
    }
}
