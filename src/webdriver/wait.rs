//! Bounded waits for element conditions.
//!
//! One attempt per assertion: the condition is polled until it holds or the
//! timeout elapses. Missing and stale elements are polled through; any other
//! driver error ends the wait immediately.

use std::thread;
use std::time::{Duration, Instant};

use super::types::{Condition, DriverError, DriverResult, ElementId, Locator, UiDriver};
use crate::config::DEFAULT_POLL_INTERVAL_MS;

pub struct Wait<'a> {
    driver: &'a dyn UiDriver,
    timeout: Duration,
    poll: Duration,
}

enum Probe {
    Met(Option<ElementId>),
    Pending,
}

impl<'a> Wait<'a> {
    pub fn new(driver: &'a dyn UiDriver, timeout: Duration) -> Self {
        Self {
            driver,
            timeout,
            poll: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn until_present(&self, locator: &Locator) -> DriverResult<ElementId> {
        self.until_element(Condition::Present, locator)
    }

    pub fn until_visible(&self, locator: &Locator) -> DriverResult<ElementId> {
        self.until_element(Condition::Visible, locator)
    }

    pub fn until_clickable(&self, locator: &Locator) -> DriverResult<ElementId> {
        self.until_element(Condition::Clickable, locator)
    }

    pub fn until_invisible(&self, locator: &Locator) -> DriverResult<()> {
        self.until(Condition::Invisible, locator).map(|_| ())
    }

    fn until_element(&self, condition: Condition, locator: &Locator) -> DriverResult<ElementId> {
        self.until(condition, locator)?
            .ok_or_else(|| DriverError::InvalidResponse(format!("{} met without an element", condition)))
    }

    /// Poll `condition` until it holds. Returns the matched element, if the
    /// condition yields one.
    pub fn until(&self, condition: Condition, locator: &Locator) -> DriverResult<Option<ElementId>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.probe(condition, locator) {
                Ok(Probe::Met(element)) => return Ok(element),
                Ok(Probe::Pending) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout {
                    condition,
                    locator: locator.clone(),
                    waited: self.timeout,
                });
            }
            thread::sleep(self.poll.min(deadline - now));
        }
    }

    fn probe(&self, condition: Condition, locator: &Locator) -> DriverResult<Probe> {
        match condition {
            Condition::Present => Ok(Probe::Met(Some(self.driver.find(locator)?))),
            Condition::Visible => {
                let element = self.driver.find(locator)?;
                if self.driver.is_displayed(&element)? {
                    Ok(Probe::Met(Some(element)))
                } else {
                    Ok(Probe::Pending)
                }
            }
            Condition::Clickable => {
                let element = self.driver.find(locator)?;
                if self.driver.is_displayed(&element)? && self.driver.is_enabled(&element)? {
                    Ok(Probe::Met(Some(element)))
                } else {
                    Ok(Probe::Pending)
                }
            }
            Condition::Invisible => {
                let element = match self.driver.find(locator) {
                    Ok(element) => element,
                    Err(e) if e.is_transient() => return Ok(Probe::Met(None)),
                    Err(e) => return Err(e),
                };
                match self.driver.is_displayed(&element) {
                    Ok(true) => Ok(Probe::Pending),
                    Ok(false) => Ok(Probe::Met(None)),
                    Err(DriverError::StaleElement(_)) => Ok(Probe::Met(None)),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
