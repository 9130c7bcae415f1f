use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::util::Wait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// A lazily resolved reference to the `index`-th match of `selector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

/// A rendered page driven one interaction at a time.
pub trait DomProvider {
    fn navigate(&mut self, url: &str) -> Result<(), ProviderError>;
    fn wait_for_elements(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, ProviderError>;
    fn hover(&mut self, element: &ElementHandle) -> Result<(), ProviderError>;
    fn wait_for_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, ProviderError>;
    fn read_inner_markup(&mut self, element: &ElementHandle) -> Result<String, ProviderError>;
    /// Release the underlying resource. Safe to call more than once.
    fn close(&mut self);
}

/// Exclusive use of one provider for one run; closes it on drop.
pub struct Session<P: DomProvider> {
    provider: P,
}

impl<P: DomProvider> Session<P> {
    pub fn new(provider: P) -> Self {
        Session { provider }
    }
}

impl<P: DomProvider> Deref for Session<P> {
    type Target = P;
    fn deref(&self) -> &P {
        &self.provider
    }
}

impl<P: DomProvider> DerefMut for Session<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}

impl<P: DomProvider> Drop for Session<P> {
    fn drop(&mut self) {
        self.provider.close();
    }
}

// ── Chromium ──

pub struct ChromeOptions {
    pub headless: bool,
    pub binary: Option<PathBuf>,
}

pub struct ChromeProvider {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeProvider {
    pub fn launch(options: &ChromeOptions) -> Result<Self, ProviderError> {
        let launch = LaunchOptions::default_builder()
            .headless(options.headless)
            .path(options.binary.clone())
            .window_size(Some((1600, 1000)))
            .build()
            .map_err(|e| ProviderError::Launch(e.to_string()))?;
        let browser = Browser::new(launch).map_err(|e| ProviderError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ProviderError::Launch(e.to_string()))?;
        info!(headless = options.headless, "browser launched");
        Ok(ChromeProvider {
            browser: Some(browser),
            tab: Some(tab),
        })
    }

    fn tab(&self) -> Result<&Arc<Tab>, ProviderError> {
        self.tab.as_ref().ok_or(ProviderError::NotLoaded)
    }

    fn element_error(handle: &ElementHandle, reason: impl ToString) -> ProviderError {
        ProviderError::Element {
            selector: handle.selector.clone(),
            index: handle.index,
            reason: reason.to_string(),
        }
    }
}

impl DomProvider for ChromeProvider {
    fn navigate(&mut self, url: &str) -> Result<(), ProviderError> {
        let nav_err = |e: anyhow::Error| ProviderError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };
        self.tab()?
            .navigate_to(url)
            .map_err(nav_err)?
            .wait_until_navigated()
            .map_err(nav_err)?;
        Ok(())
    }

    fn wait_for_elements(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, ProviderError> {
        let tab = self.tab()?;
        tab.set_default_timeout(timeout);
        let found = tab
            .wait_for_elements(selector)
            .map_err(|_| ProviderError::Timeout {
                selector: selector.to_string(),
                timeout,
            })?;
        Ok((0..found.len())
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    fn hover(&mut self, element: &ElementHandle) -> Result<(), ProviderError> {
        let tab = self.tab()?;
        let found = tab
            .find_elements(&element.selector)
            .map_err(|e| Self::element_error(element, e))?;
        let target = found
            .get(element.index)
            .ok_or_else(|| Self::element_error(element, "no longer on the page"))?;
        target
            .scroll_into_view()
            .map_err(|e| Self::element_error(element, e))?;
        target
            .move_mouse_over()
            .map_err(|e| Self::element_error(element, e))?;
        Ok(())
    }

    fn wait_for_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, ProviderError> {
        let tab = self.tab()?;
        Wait::with_timeout(timeout)
            .until(|| {
                let el = tab.find_element(selector).ok()?;
                let bounds = el.get_box_model().ok()?;
                (bounds.width > 0.0 && bounds.height > 0.0).then_some(())
            })
            .map_err(|_| ProviderError::Timeout {
                selector: selector.to_string(),
                timeout,
            })?;
        Ok(ElementHandle {
            selector: selector.to_string(),
            index: 0,
        })
    }

    fn read_inner_markup(&mut self, element: &ElementHandle) -> Result<String, ProviderError> {
        let tab = self.tab()?;
        let found = tab
            .find_elements(&element.selector)
            .map_err(|e| Self::element_error(element, e))?;
        let target = found
            .get(element.index)
            .ok_or_else(|| Self::element_error(element, "no longer on the page"))?;
        let result = target
            .call_js_fn("function() { return this.innerHTML; }", vec![], false)
            .map_err(|e| Self::element_error(element, e))?;
        result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Self::element_error(element, "innerHTML was not a string"))
    }

    fn close(&mut self) {
        self.tab = None;
        if self.browser.take().is_some() {
            info!("browser closed");
        }
    }
}

// ── Pre-rendered documents ──

/// Serves a page that was rendered elsewhere (a saved file or a server-side
/// rendered URL). Each card is expected to carry its popover markup inline.
#[derive(Default)]
pub struct StaticProvider {
    document: Option<String>,
    cards: Vec<String>,
    hovered: Option<usize>,
    visible: Option<String>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that already holds `html`; `navigate` is then a no-op.
    #[cfg(test)]
    pub fn from_html(html: impl Into<String>) -> Self {
        StaticProvider {
            document: Some(html.into()),
            ..Self::default()
        }
    }

    fn load(url: &str) -> Result<String, ProviderError> {
        let nav_err = |reason: String| ProviderError::Navigation {
            url: url.to_string(),
            reason,
        };
        if url.starts_with("http://") || url.starts_with("https://") {
            reqwest::blocking::get(url)
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
                .map_err(|e| nav_err(e.to_string()))
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            std::fs::read_to_string(path).map_err(|e| nav_err(e.to_string()))
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ProviderError> {
    Selector::parse(selector).map_err(|_| ProviderError::Selector(selector.to_string()))
}

impl DomProvider for StaticProvider {
    fn navigate(&mut self, url: &str) -> Result<(), ProviderError> {
        if self.document.is_none() {
            self.document = Some(Self::load(url)?);
            debug!(url, "document loaded");
        }
        Ok(())
    }

    fn wait_for_elements(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, ProviderError> {
        let document = self.document.as_deref().ok_or(ProviderError::NotLoaded)?;
        let sel = parse_selector(selector)?;
        let html = Html::parse_document(document);
        self.cards = html.select(&sel).map(|el| el.html()).collect();

        if self.cards.is_empty() {
            return Err(ProviderError::Timeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        Ok((0..self.cards.len())
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    fn hover(&mut self, element: &ElementHandle) -> Result<(), ProviderError> {
        if element.index >= self.cards.len() {
            return Err(ProviderError::Element {
                selector: element.selector.clone(),
                index: element.index,
                reason: "no such card".to_string(),
            });
        }
        self.hovered = Some(element.index);
        self.visible = None;
        Ok(())
    }

    fn wait_for_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, ProviderError> {
        let sel = parse_selector(selector)?;
        let card = self
            .hovered
            .and_then(|i| self.cards.get(i))
            .ok_or(ProviderError::NotLoaded)?;
        let fragment = Html::parse_fragment(card);
        let popover = fragment
            .select(&sel)
            .next()
            .ok_or_else(|| ProviderError::Timeout {
                selector: selector.to_string(),
                timeout,
            })?;
        self.visible = Some(popover.inner_html());
        Ok(ElementHandle {
            selector: selector.to_string(),
            index: 0,
        })
    }

    fn read_inner_markup(&mut self, element: &ElementHandle) -> Result<String, ProviderError> {
        self.visible.clone().ok_or_else(|| ProviderError::Element {
            selector: element.selector.clone(),
            index: element.index,
            reason: "not visible".to_string(),
        })
    }

    fn close(&mut self) {
        self.document = None;
        self.cards.clear();
        self.hovered = None;
        self.visible = None;
    }
}

/// Provider choice from the `BROWSER` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chromium,
    Static,
}

impl BrowserKind {
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("chromium") | Some("chrome") => BrowserKind::Chromium,
            Some("static") => BrowserKind::Static,
            Some(other) => {
                warn!(browser = other, "browser not supported, defaulting to Chromium");
                BrowserKind::Chromium
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="avatar-card"><span>A</span><div class="tippy-content"><img alt="x"><img alt="Anby"></div></div>
        <div class="avatar-card"><span>B</span></div>
        <div class="avatar-card"><span>C</span><div class="tippy-content"><b>Corin</b></div></div>
    </body></html>"#;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn static_cards_and_popovers() {
        let mut p = StaticProvider::from_html(PAGE);
        p.navigate("ignored").unwrap();
        let cards = p.wait_for_elements(".avatar-card", WAIT).unwrap();
        assert_eq!(cards.len(), 3);

        p.hover(&cards[0]).unwrap();
        let pop = p.wait_for_visible(".tippy-content", WAIT).unwrap();
        assert_eq!(
            p.read_inner_markup(&pop).unwrap(),
            r#"<img alt="x"><img alt="Anby">"#
        );

        p.hover(&cards[1]).unwrap();
        assert!(matches!(
            p.wait_for_visible(".tippy-content", WAIT),
            Err(ProviderError::Timeout { .. })
        ));

        p.hover(&cards[2]).unwrap();
        let pop = p.wait_for_visible(".tippy-content", WAIT).unwrap();
        assert_eq!(p.read_inner_markup(&pop).unwrap(), "<b>Corin</b>");
    }

    #[test]
    fn static_without_cards_times_out() {
        let mut p = StaticProvider::from_html("<html><body><p>maintenance</p></body></html>");
        p.navigate("ignored").unwrap();
        assert!(matches!(
            p.wait_for_elements(".avatar-card", WAIT),
            Err(ProviderError::Timeout { .. })
        ));
    }

    #[test]
    fn static_missing_file_is_navigation_error() {
        let mut p = StaticProvider::new();
        let err = p.navigate("/definitely/not/here.html").unwrap_err();
        assert!(matches!(err, ProviderError::Navigation { .. }));
    }

    #[test]
    fn browser_setting() {
        assert_eq!(BrowserKind::from_setting(None), BrowserKind::Chromium);
        assert_eq!(BrowserKind::from_setting(Some("Chrome")), BrowserKind::Chromium);
        assert_eq!(BrowserKind::from_setting(Some("static")), BrowserKind::Static);
        assert_eq!(BrowserKind::from_setting(Some("firefox")), BrowserKind::Chromium);
    }
}
