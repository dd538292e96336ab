//! Navigation and configuration of the ledger report screen, driven through
//! a borrowed [`BrowserDriver`].

use tracing::{debug, info, warn};

use crate::driver::{
    BrowserDriver, ElementRole, UiMap, ACCOUNT_DROPDOWN, COMPANY_DROPDOWN, FORMAT_DROPDOWN,
};
use crate::error::SessionError;
use crate::models::ExtractionTarget;
use crate::settings::VerificationPolicy;

/// URL fragment present on every ledger report page.
pub const LEDGER_PAGE_MARKER: &str = "LibroMayor";

/// The navigation and configuration collaborator the orchestrator drives.
/// Calls are made strictly one at a time.
pub trait ReportSession {
    /// Applies the target's selections to the parameter screen.
    fn configure(&mut self, target: &ExtractionTarget) -> Result<(), SessionError>;
    /// Fires the report's generate action.
    fn trigger(&mut self) -> Result<(), SessionError>;
    /// Returns to the parameter screen after a target.
    fn return_to_parameters(&mut self) -> Result<(), SessionError>;
    /// Alternative recovery: walk the menus from the portal home.
    fn renavigate_from_menu(&mut self) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Default)]
pub struct PortalUrls {
    pub home: String,
    pub ledger_report: String,
}

/// [`ReportSession`] over a driver it borrows and never closes.
pub struct DriverSession<'a, D: BrowserDriver + ?Sized> {
    driver: &'a mut D,
    ui: UiMap,
    urls: PortalUrls,
    policy: VerificationPolicy,
    screenshots: bool,
    current_code: Option<String>,
}

impl<'a, D: BrowserDriver + ?Sized> DriverSession<'a, D> {
    pub fn new(driver: &'a mut D, urls: PortalUrls, policy: VerificationPolicy) -> Self {
        Self {
            driver,
            ui: UiMap::ledger_portal(),
            urls,
            policy,
            screenshots: true,
            current_code: None,
        }
    }

    pub fn with_ui_map(mut self, ui: UiMap) -> Self {
        self.ui = ui;
        self
    }

    pub fn without_screenshots(mut self) -> Self {
        self.screenshots = false;
        self
    }

    fn select(&mut self, label: &str, value: &str) -> Result<(), SessionError> {
        let chain = self.ui.chain(&ElementRole::Dropdown(label.to_string()))?;
        let element = chain.resolve(&mut *self.driver)?;
        self.driver.select_option(&element, value)?;
        debug!(dropdown = label, value, "option selected");
        Ok(())
    }

    /// Writes a date field and reads it back; the portal silently restores
    /// the old value when fields are set in the wrong order.
    fn write_date(&mut self, role: ElementRole, value: &str) -> Result<(), SessionError> {
        let element = self.ui.chain(&role)?.resolve(&mut *self.driver)?;
        self.driver.write_field(&element, value)?;
        let read_back = self.driver.read_field(&element)?;
        if read_back.trim() != value {
            return Err(SessionError::Verification(format!(
                "{role} reverted: wrote '{value}', page shows '{}'",
                read_back.trim()
            )));
        }
        Ok(())
    }

    fn click(&mut self, role: ElementRole) -> Result<(), SessionError> {
        let element = self.ui.chain(&role)?.resolve(&mut *self.driver)?;
        self.driver.click(&element)?;
        Ok(())
    }

    fn capture(&mut self, stage: &str) {
        if !self.screenshots {
            return;
        }
        let name = match &self.current_code {
            Some(code) => format!("{code}_{stage}"),
            None => stage.to_string(),
        };
        match self.driver.screenshot(&name) {
            Ok(path) => debug!(path = %path.display(), "screenshot saved"),
            Err(e) => warn!(error = %e, "screenshot failed"),
        }
    }

    /// Confirms the browser sits on a ledger report page.
    fn verify_on_report(&mut self) -> Result<(), SessionError> {
        let url = self.driver.current_url().unwrap_or_default();
        if url.contains(LEDGER_PAGE_MARKER) {
            return Ok(());
        }
        match self.policy {
            VerificationPolicy::Lenient => {
                warn!(%url, "landing page not confirmed, assuming report screen");
                Ok(())
            }
            VerificationPolicy::Strict => Err(SessionError::Verification(format!(
                "expected a ledger report page, browser is at '{url}'"
            ))),
        }
    }

    fn walk_menus(&mut self) -> Result<(), SessionError> {
        if !self.urls.home.is_empty() {
            let home = self.urls.home.clone();
            self.driver.navigate(&home)?;
        }
        for role in [
            ElementRole::AccountingMenu,
            ElementRole::ReportsMenu,
            ElementRole::AccountingBooksMenu,
            ElementRole::LedgerReportLink,
        ] {
            self.click(role)?;
        }
        Ok(())
    }
}

impl<D: BrowserDriver + ?Sized> ReportSession for DriverSession<'_, D> {
    fn configure(&mut self, target: &ExtractionTarget) -> Result<(), SessionError> {
        self.current_code = Some(target.code());
        let criteria = &target.criteria;

        // Every dropdown goes before the dates.
        self.select(COMPANY_DROPDOWN, &target.company)?;
        self.select(ACCOUNT_DROPDOWN, &target.account)?;
        for (label, value) in &criteria.extra_selections {
            self.select(label, value)?;
        }
        if !criteria.output_format.is_empty() {
            self.select(FORMAT_DROPDOWN, &criteria.output_format)?;
        }

        self.write_date(ElementRole::DateFrom, &criteria.date_range.from_portal())?;
        self.write_date(ElementRole::DateTo, &criteria.date_range.to_portal())?;

        info!(target_key = %target.key(), "parameters configured");
        self.capture("configured");
        Ok(())
    }

    fn trigger(&mut self) -> Result<(), SessionError> {
        self.click(ElementRole::GenerateButton)?;
        info!("report generation requested");
        self.capture("generated");
        Ok(())
    }

    fn return_to_parameters(&mut self) -> Result<(), SessionError> {
        match self.click(ElementRole::LedgerReportLink) {
            Ok(()) => {}
            Err(e) if !self.urls.ledger_report.is_empty() => {
                debug!(error = %e, "report link missing, loading report url");
                let url = self.urls.ledger_report.clone();
                self.driver.navigate(&url)?;
            }
            Err(e) => return Err(e),
        }
        self.verify_on_report()
    }

    fn renavigate_from_menu(&mut self) -> Result<(), SessionError> {
        self.walk_menus()?;
        info!("report screen reached through menus");
        self.verify_on_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::driver::{Locator, LocatorChain};
    use crate::models::{DateRange, SelectionCriteria};
    use chrono::NaiveDate;

    const FROM: &str = "css=input[name='Desde']";
    const TO: &str = "css=input[name='Hasta']";

    fn target() -> ExtractionTarget {
        let mut criteria = SelectionCriteria::new(
            DateRange::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            ),
            "EXCEL",
        );
        criteria
            .extra_selections
            .insert("Tipo de Reporte".into(), "ANALISIS POR CUENTA".into());
        ExtractionTarget {
            company: "76123456-7, Comercial Sur".into(),
            account: "1101-01 CUENTA CAJA".into(),
            criteria,
        }
    }

    fn portal_driver() -> FakeDriver {
        FakeDriver {
            present: vec![
                Locator::Css("select[name='ComboEmpresa']".into()),
                Locator::Css("select[name='ComboCodigoSubcuenta']".into()),
                Locator::Css("select[name='ComboFormato']".into()),
                Locator::Css("select[name='ComboTipoReporte']".into()),
                Locator::Css("input[name='Desde']".into()),
                Locator::Css("input[name='Hasta']".into()),
                Locator::Css("#BotonAceptar".into()),
            ],
            ..Default::default()
        }
    }

    fn urls() -> PortalUrls {
        PortalUrls {
            home: "https://portal.test/home".into(),
            ledger_report: "https://portal.test/conReportesLibroMayorGenerar.asp".into(),
        }
    }

    #[test]
    fn test_configure_sets_dropdowns_before_dates() {
        let mut driver = portal_driver();
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient);
        session.configure(&target()).unwrap();

        let calls = &driver.calls;
        let first_date = calls.iter().position(|c| c.starts_with("write")).unwrap();
        let last_select = calls.iter().rposition(|c| c.starts_with("select")).unwrap();
        assert!(last_select < first_date, "calls: {calls:?}");
        assert!(calls.contains(&format!("write {FROM} = 01/01/2025")));
        assert!(calls.contains(&format!("write {TO} = 01/02/2025")));
        assert!(calls.contains(&"select css=select[name='ComboFormato'] = EXCEL".to_string()));
        assert_eq!(calls.last().unwrap(), "screenshot 76123456_7_1101_01_configured");
    }

    #[test]
    fn test_reverted_date_fails_configuration() {
        let mut driver = portal_driver();
        driver.reverted.insert(FROM.into(), "01/12/2024".into());
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient);
        let err = session.configure(&target()).unwrap_err();
        assert!(matches!(err, SessionError::Verification(ref m) if m.contains("01/12/2024")));
    }

    #[test]
    fn test_missing_dropdown_fails_configuration() {
        let mut driver = FakeDriver::default();
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient);
        assert_eq!(
            session.configure(&target()).unwrap_err(),
            SessionError::ElementNotFound {
                role: "dropdown 'Empresa'".into()
            }
        );
    }

    #[test]
    fn test_trigger_clicks_generate() {
        let mut driver = portal_driver();
        let mut session =
            DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient).without_screenshots();
        session.trigger().unwrap();
        assert_eq!(driver.calls, vec!["click css=#BotonAceptar"]);
    }

    #[test]
    fn test_custom_ui_map_overrides_locators() {
        let mut driver = FakeDriver {
            present: vec![Locator::XPath("//input[@value='Generar']".into())],
            ..Default::default()
        };
        let mut ui = UiMap::default();
        ui.insert(LocatorChain::new(
            ElementRole::GenerateButton,
            vec![
                Locator::Css("#BotonAceptar".into()),
                Locator::XPath("//input[@value='Generar']".into()),
            ],
        ));
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient)
            .with_ui_map(ui)
            .without_screenshots();
        session.trigger().unwrap();
        assert_eq!(driver.calls, vec!["click xpath=//input[@value='Generar']"]);
    }

    #[test]
    fn test_return_falls_back_to_report_url() {
        let mut driver = portal_driver();
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Strict);
        session.return_to_parameters().unwrap();
        assert_eq!(
            driver.calls,
            vec!["navigate https://portal.test/conReportesLibroMayorGenerar.asp"]
        );
    }

    #[test]
    fn test_return_fails_when_navigation_fails() {
        let mut driver = portal_driver();
        driver.fail_navigation = true;
        let mut session = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient);
        assert!(matches!(
            session.return_to_parameters(),
            Err(SessionError::Driver(_))
        ));
    }

    #[test]
    fn test_verification_policy_on_unexpected_page() {
        let mut driver = portal_driver();
        driver.present.push(Locator::LinkText("Contabilidad".into()));
        driver.present.push(Locator::LinkText("Reportes".into()));
        driver.present.push(Locator::LinkText("Libros Contables".into()));
        driver.present.push(Locator::LinkText("Mayor".into()));

        let mut lenient = DriverSession::new(&mut driver, urls(), VerificationPolicy::Lenient);
        lenient.renavigate_from_menu().unwrap();

        let mut strict = DriverSession::new(&mut driver, urls(), VerificationPolicy::Strict);
        assert!(matches!(
            strict.renavigate_from_menu(),
            Err(SessionError::Verification(_))
        ));
    }
}
