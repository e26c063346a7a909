//! Selector packs for the target site's known markup variants.
//!
//! This file contains every fallback chain the harvester uses. Update this
//! file when the site changes its HTML structure.
//!
//! **Update process**: when a mandatory locator starts failing, capture the
//! diagnostics screenshot, find the new markup, and prepend the new selector
//! to the chain — keep the old variants as fallbacks for staggered rollouts.

use crate::core::ListKind;

use super::LocatorSpec;

// ── Login surface ────────────────────────────────────────────────────────────

/// Username / email input on the login form. Mandatory.
pub const USERNAME_INPUT: LocatorSpec = LocatorSpec::new(
    "username input",
    &[
        "input[name='username']",
        "input[type='text'][autocomplete='username']",
        "input[placeholder*='mail']",
        "form input[type='text']",
    ],
);

/// Password input on the login form. Mandatory.
pub const PASSWORD_INPUT: LocatorSpec = LocatorSpec::new(
    "password input",
    &[
        "input[type='password']",
        "input[autocomplete='current-password']",
        "input[name='password']",
    ],
);

/// Submit control of the login form. Mandatory.
pub const LOGIN_SUBMIT: LocatorSpec = LocatorSpec::new(
    "login submit",
    &[
        "button[data-e2e='login-button']",
        "button[type='submit']",
        "form button",
    ],
);

/// Present only while logged out — its absence is the authentication probe.
pub const LOGGED_OUT_MARKER: LocatorSpec = LocatorSpec::new(
    "logged-out marker",
    &[
        "button[data-e2e='top-login-button']",
        "#header-login-button",
        "a[href*='/login']",
    ],
);

// ── CAPTCHA checkpoint ───────────────────────────────────────────────────────

/// Root of the verification overlay. Presence means the checkpoint is up.
pub const CAPTCHA_MARKER: LocatorSpec = LocatorSpec::new(
    "captcha marker",
    &[
        "div.captcha_verify_container",
        "div[class*='captcha_verify']",
        "div[class*='secsdk-captcha']",
        "#captcha_container",
    ],
);

/// Drag knob of the slider puzzle.
pub const SLIDER_HANDLE: LocatorSpec = LocatorSpec::new(
    "slider handle",
    &[
        "div.secsdk-captcha-drag-icon",
        "div[class*='captcha-drag-icon']",
        "div[class*='drag-button']",
    ],
);

/// Track the knob slides along; its width bounds the drag distance.
pub const SLIDER_TRACK: LocatorSpec = LocatorSpec::new(
    "slider track",
    &[
        "div.secsdk-captcha-drag-wrapper",
        "div[class*='captcha_verify_slide']",
        "div[class*='drag-wrapper']",
    ],
);

// ── Transient popups ─────────────────────────────────────────────────────────

/// Dismiss controls for the popups that show up after login. Best-effort:
/// none of these are mandatory, an unresolved popup is just absent.
pub const POPUP_DISMISSERS: &[LocatorSpec] = &[
    LocatorSpec::new(
        "modal close",
        &[
            "div[data-e2e='modal-close-inner-button']",
            "button[aria-label='Close']",
            "div[class*='DivCloseWrapper']",
        ],
    ),
    LocatorSpec::new(
        "cookie banner accept",
        &[
            "div.tiktok-cookie-banner button:last-child",
            "button[class*='accept']",
        ],
    ),
    LocatorSpec::new(
        "app download prompt",
        &[
            "div[data-e2e='download-guide'] div[class*='close']",
            "div[class*='DivDownloadGuide'] [class*='close']",
        ],
    ),
];

// ── Roster surface ───────────────────────────────────────────────────────────

/// Clickable follower/following counter on the profile header. Secondary
/// path: only used when direct URL navigation does not surface the list.
pub const fn count_control(kind: ListKind) -> LocatorSpec {
    match kind {
        ListKind::Following => LocatorSpec::new(
            "following count",
            &[
                "strong[data-e2e='following-count']",
                "span[data-e2e='following-count']",
                "div[class*='CountInfos'] div:first-child",
            ],
        ),
        ListKind::Followers => LocatorSpec::new(
            "followers count",
            &[
                "strong[data-e2e='followers-count']",
                "span[data-e2e='followers-count']",
                "div[class*='CountInfos'] div:nth-child(2)",
            ],
        ),
    }
}

/// Per-record container in the virtualized roster list.
pub const RECORD_CONTAINER: LocatorSpec = LocatorSpec::new(
    "record container",
    &[
        "div[data-e2e='follow-item']",
        "li[data-e2e='follow-item']",
        "div[class*='DivUserItemContainer']",
        "li[class*='user-item']",
    ],
);

/// Unique handle inside a record container.
pub const RECORD_USERNAME: LocatorSpec = LocatorSpec::new(
    "record username",
    &[
        "p[data-e2e='follow-user-id']",
        "span[data-e2e='follow-username']",
        "p[class*='user-uniqueid']",
    ],
);

/// Human-readable name inside a record container.
pub const RECORD_DISPLAY_NAME: LocatorSpec = LocatorSpec::new(
    "record display name",
    &[
        "span[data-e2e='follow-nickname']",
        "div[class*='nickname']",
        "span[class*='SpanNickname']",
    ],
);

/// Profile link inside a record container.
pub const RECORD_LINK: LocatorSpec = LocatorSpec::new(
    "record link",
    &["a[data-e2e='follow-user-avatar']", "a[href^='/@']"],
);
