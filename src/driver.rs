//! The browser capability the session drives, and the ordered locator
//! fallbacks used to find each UI element.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{DriverError, SessionError};

pub const COMPANY_DROPDOWN: &str = "Empresa";
pub const ACCOUNT_DROPDOWN: &str = "Cuenta Contable";
pub const FORMAT_DROPDOWN: &str = "Formato de Salida";

/// Opaque handle to an element the driver located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::LinkText(s) => write!(f, "link={s}"),
        }
    }
}

/// Minimal browser surface. Implementations own waiting and visibility
/// checks; `find` returns `Ok(None)` when nothing visible matches.
pub trait BrowserDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;
    fn current_url(&mut self) -> Result<String, DriverError>;
    fn find(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError>;
    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;
    fn read_field(&mut self, element: &ElementHandle) -> Result<String, DriverError>;
    fn write_field(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;
    fn select_option(&mut self, element: &ElementHandle, option_text: &str) -> Result<(), DriverError>;
    fn screenshot(&mut self, name: &str) -> Result<PathBuf, DriverError>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementRole {
    /// A parameter dropdown, by its on-screen label.
    Dropdown(String),
    DateFrom,
    DateTo,
    GenerateButton,
    AccountingMenu,
    ReportsMenu,
    AccountingBooksMenu,
    LedgerReportLink,
}

impl fmt::Display for ElementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropdown(label) => write!(f, "dropdown '{label}'"),
            Self::DateFrom => write!(f, "date-from field"),
            Self::DateTo => write!(f, "date-to field"),
            Self::GenerateButton => write!(f, "generate button"),
            Self::AccountingMenu => write!(f, "accounting menu"),
            Self::ReportsMenu => write!(f, "reports menu"),
            Self::AccountingBooksMenu => write!(f, "accounting books menu"),
            Self::LedgerReportLink => write!(f, "ledger report link"),
        }
    }
}

/// Ordered fallbacks for one role; the first locator that finds an element
/// wins.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorChain {
    pub role: ElementRole,
    pub candidates: Vec<Locator>,
}

impl LocatorChain {
    pub fn new(role: ElementRole, candidates: Vec<Locator>) -> Self {
        Self { role, candidates }
    }

    pub fn resolve<D: BrowserDriver + ?Sized>(&self, driver: &mut D) -> Result<ElementHandle, SessionError> {
        for locator in &self.candidates {
            match driver.find(locator) {
                Ok(Some(handle)) => {
                    debug!(role = %self.role, %locator, "element located");
                    return Ok(handle);
                }
                Ok(None) => debug!(role = %self.role, %locator, "no match"),
                Err(e) => debug!(role = %self.role, %locator, error = %e, "locator failed"),
            }
        }
        Err(SessionError::ElementNotFound {
            role: self.role.to_string(),
        })
    }
}

/// Locator chains for every role the session touches.
#[derive(Debug, Clone, Default)]
pub struct UiMap {
    chains: BTreeMap<ElementRole, LocatorChain>,
}

impl UiMap {
    pub fn insert(&mut self, chain: LocatorChain) {
        self.chains.insert(chain.role.clone(), chain);
    }

    /// The registered chain, or a generic one for dropdowns without an
    /// explicit entry.
    pub fn chain(&self, role: &ElementRole) -> Result<LocatorChain, SessionError> {
        if let Some(chain) = self.chains.get(role) {
            return Ok(chain.clone());
        }
        match role {
            ElementRole::Dropdown(label) => Ok(dropdown_chain(label, None)),
            _ => Err(SessionError::ElementNotFound {
                role: role.to_string(),
            }),
        }
    }

    /// Chains for the ledger report portal.
    pub fn ledger_portal() -> Self {
        let mut map = Self::default();
        map.insert(dropdown_chain(COMPANY_DROPDOWN, Some("ComboEmpresa")));
        map.insert(dropdown_chain(ACCOUNT_DROPDOWN, Some("ComboCodigoSubcuenta")));
        map.insert(dropdown_chain(FORMAT_DROPDOWN, Some("ComboFormato")));
        map.insert(dropdown_chain("Tipo de Reporte", Some("ComboTipoReporte")));
        map.insert(dropdown_chain("Incluir Subcuentas", Some("ComboIncluirSubcuentas")));
        map.insert(LocatorChain::new(
            ElementRole::DateFrom,
            vec![
                Locator::Css("input[name='Desde']".into()),
                Locator::XPath("//input[contains(@id, 'Desde')]".into()),
            ],
        ));
        map.insert(LocatorChain::new(
            ElementRole::DateTo,
            vec![
                Locator::Css("input[name='Hasta']".into()),
                Locator::XPath("//input[contains(@id, 'Hasta')]".into()),
            ],
        ));
        map.insert(LocatorChain::new(
            ElementRole::GenerateButton,
            vec![
                Locator::XPath(
                    "//a[@id='BotonAceptar' and @class='BotonActivo' and contains(@onclick, 'p_ValidarFormulario')]".into(),
                ),
                Locator::Css("#BotonAceptar".into()),
                Locator::Css("a.BotonActivo".into()),
                Locator::XPath("//input[@value='Aceptar']".into()),
                Locator::XPath("//button[contains(text(), 'Aceptar')]".into()),
                Locator::XPath("//a[contains(text(), 'Aceptar')]".into()),
            ],
        ));
        map.insert(menu_chain(ElementRole::AccountingMenu, "Contabilidad"));
        map.insert(menu_chain(ElementRole::ReportsMenu, "Reportes"));
        map.insert(menu_chain(ElementRole::AccountingBooksMenu, "Libros Contables"));
        map.insert(LocatorChain::new(
            ElementRole::LedgerReportLink,
            vec![
                Locator::XPath("//a[@href='conReportesLibroMayorGenerar.asp']".into()),
                Locator::XPath("//a[text()='Mayor' and contains(@href, 'LibroMayor')]".into()),
                Locator::LinkText("Mayor".into()),
            ],
        ));
        map
    }
}

fn dropdown_chain(label: &str, name: Option<&str>) -> LocatorChain {
    let mut candidates = Vec::new();
    if let Some(name) = name {
        candidates.push(Locator::Css(format!("select[name='{name}']")));
    }
    candidates.push(Locator::XPath(format!(
        "//td[contains(normalize-space(.), '{label}')]/following-sibling::td//select"
    )));
    candidates.push(Locator::XPath(format!(
        "//label[contains(normalize-space(.), '{label}')]/following::select[1]"
    )));
    LocatorChain::new(ElementRole::Dropdown(label.to_string()), candidates)
}

fn menu_chain(role: ElementRole, text: &str) -> LocatorChain {
    LocatorChain::new(
        role,
        vec![
            Locator::LinkText(text.to_string()),
            Locator::XPath(format!("//a[contains(normalize-space(.), '{text}')]")),
            Locator::XPath(format!("//span[contains(normalize-space(.), '{text}')]/parent::a")),
        ],
    )
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Records every call; elements exist for the locators in `present`.
    #[derive(Default)]
    pub struct FakeDriver {
        pub present: Vec<Locator>,
        pub fields: BTreeMap<String, String>,
        /// Values the page silently restores after a write.
        pub reverted: BTreeMap<String, String>,
        pub url: String,
        pub calls: Vec<String>,
        pub fail_navigation: bool,
    }

    impl BrowserDriver for FakeDriver {
        fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
            self.calls.push(format!("navigate {url}"));
            if self.fail_navigation {
                return Err(DriverError::Navigation {
                    url: url.into(),
                    message: "net::ERR".into(),
                });
            }
            self.url = url.to_string();
            Ok(())
        }

        fn current_url(&mut self) -> Result<String, DriverError> {
            Ok(self.url.clone())
        }

        fn find(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError> {
            Ok(self
                .present
                .contains(locator)
                .then(|| ElementHandle(locator.to_string())))
        }

        fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
            self.calls.push(format!("click {}", element.0));
            Ok(())
        }

        fn read_field(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
            Ok(self.fields.get(&element.0).cloned().unwrap_or_default())
        }

        fn write_field(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
            self.calls.push(format!("write {} = {value}", element.0));
            let stored = self
                .reverted
                .get(&element.0)
                .cloned()
                .unwrap_or_else(|| value.to_string());
            self.fields.insert(element.0.clone(), stored);
            Ok(())
        }

        fn select_option(&mut self, element: &ElementHandle, option_text: &str) -> Result<(), DriverError> {
            self.calls.push(format!("select {} = {option_text}", element.0));
            Ok(())
        }

        fn screenshot(&mut self, name: &str) -> Result<PathBuf, DriverError> {
            self.calls.push(format!("screenshot {name}"));
            Ok(PathBuf::from(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeDriver;
    use super::*;

    #[test]
    fn test_chain_uses_first_present_locator() {
        let map = UiMap::ledger_portal();
        let chain = map.chain(&ElementRole::GenerateButton).unwrap();
        let mut driver = FakeDriver {
            present: vec![
                Locator::Css("a.BotonActivo".into()),
                Locator::Css("#BotonAceptar".into()),
            ],
            ..Default::default()
        };
        let handle = chain.resolve(&mut driver).unwrap();
        assert_eq!(handle, ElementHandle("css=#BotonAceptar".into()));
    }

    #[test]
    fn test_chain_reports_missing_role() {
        let chain = UiMap::ledger_portal()
            .chain(&ElementRole::LedgerReportLink)
            .unwrap();
        let err = chain.resolve(&mut FakeDriver::default()).unwrap_err();
        assert_eq!(
            err,
            SessionError::ElementNotFound {
                role: "ledger report link".into()
            }
        );
    }

    #[test]
    fn test_unknown_dropdown_gets_generic_chain() {
        let chain = UiMap::default()
            .chain(&ElementRole::Dropdown("Formato".into()))
            .unwrap();
        assert_eq!(chain.candidates.len(), 2);
        assert!(UiMap::default().chain(&ElementRole::DateFrom).is_err());
    }
}
