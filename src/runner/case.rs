//! Executes setup blocks and cases against one live session.

use serde_json::json;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::recorder::ResultRecorder;
use super::suite::{Action, CaseSpec, Entry, SetupBlock, Step, Suite, Tier};
use super::types::{CaseInfo, StepOutcome};
use crate::config::WaitSettings;
use crate::webdriver::{DriverError, DriverResult, Locator, UiDriver, Wait};

/// Android keycode for BACK
const KEYCODE_BACK: u32 = 4;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("step {index} ({action}) failed")]
    Action {
        index: usize,
        action: String,
        #[source]
        source: DriverError,
    },

    #[error("setup '{block}' failed")]
    Setup {
        block: String,
        #[source]
        source: Box<StepError>,
    },

    /// Assertion raised by hand-written case bodies
    #[error("{0}")]
    Check(String),
}

pub struct CaseRunner<'a> {
    driver: &'a dyn UiDriver,
    recorder: &'a mut ResultRecorder,
    waits: WaitSettings,
    next_number: u32,
}

impl<'a> CaseRunner<'a> {
    pub fn new(driver: &'a dyn UiDriver, recorder: &'a mut ResultRecorder, waits: WaitSettings) -> Self {
        Self {
            driver,
            recorder,
            waits,
            next_number: 1,
        }
    }

    /// Number the next case will get
    pub fn next_number(&self) -> u32 {
        self.next_number
    }

    pub fn wait(&self, tier: Tier) -> Wait<'a> {
        let timeout = match tier {
            Tier::Short => self.waits.short,
            Tier::Long => self.waits.long,
            Tier::Launch => self.waits.launch,
        };
        Wait::new(self.driver, timeout).poll_interval(self.waits.poll_interval)
    }

    /// Perform one action; one wait attempt, no retries
    pub fn perform(&self, action: &Action) -> DriverResult<()> {
        match action {
            Action::Tap { locator, timeout } => {
                let element = self.wait(*timeout).until_clickable(locator)?;
                self.driver.click(&element)
            }
            Action::TapAt { at } => self.driver.tap(*at),
            Action::Type {
                locator,
                text,
                clear,
                timeout,
            } => {
                let element = self.wait(*timeout).until_clickable(locator)?;
                self.driver.click(&element)?;
                if *clear {
                    self.driver.clear(&element)?;
                }
                self.driver.send_keys(&element, text)
            }
            Action::Swipe {
                from,
                to,
                duration_ms,
            } => self
                .driver
                .swipe(*from, *to, Duration::from_millis(*duration_ms)),
            Action::WaitVisible { locator, timeout } => {
                self.wait(*timeout).until_visible(locator).map(|_| ())
            }
            Action::WaitInvisible { locator, timeout } => self.wait(*timeout).until_invisible(locator),
            Action::WaitClickable { locator, timeout } => {
                self.wait(*timeout).until_clickable(locator).map(|_| ())
            }
            Action::WaitPresent { locator, timeout } => {
                self.wait(*timeout).until_present(locator).map(|_| ())
            }
            Action::WaitImage { image, within, timeout } => {
                self.wait_image(image, within.as_ref(), *timeout)
            }
            Action::Sleep { ms } => {
                thread::sleep(Duration::from_millis(*ms));
                Ok(())
            }
            Action::Back => self.driver.press_keycode(KEYCODE_BACK),
            Action::Navigate { url } => self.driver.navigate(url),
        }
    }

    /// Wait for `image` to be present, searching only inside `within` when given.
    /// The search area is reset afterwards whether or not the image was found.
    fn wait_image(&self, image: &str, within: Option<&Locator>, tier: Tier) -> DriverResult<()> {
        let found = self.scoped_image_search(image, within, tier);
        if within.is_some() {
            if let Err(e) = self.driver.update_settings(json!({ "imageElementRect": {} })) {
                warn!(device = %self.recorder.device_label(), "failed to reset image search area: {}", e);
            }
        }
        found
    }

    fn scoped_image_search(&self, image: &str, within: Option<&Locator>, tier: Tier) -> DriverResult<()> {
        if let Some(area) = within {
            let element = self.wait(tier).until_present(area)?;
            let rect = self.driver.rect(&element)?;
            self.driver.update_settings(json!({
                "imageElementRect": {
                    "left": rect.x,
                    "top": rect.y,
                    "width": rect.width,
                    "height": rect.height,
                }
            }))?;
        }
        self.wait(tier)
            .until_present(&Locator::Image(image.to_string()))
            .map(|_| ())
    }

    /// Run steps in order, stopping at the first non-optional failure
    pub fn run_steps(&self, steps: &[Step]) -> Result<(), StepError> {
        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;
            if let Err(source) = self.perform(&step.action) {
                if step.optional {
                    warn!(
                        device = %self.recorder.device_label(),
                        "optional step {} ({}) skipped: {}",
                        index,
                        step.action.describe(),
                        source
                    );
                    continue;
                }
                return Err(StepError::Action {
                    index,
                    action: step.action.describe(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Run an unrecorded setup block.
    ///
    /// Failure is returned (and aborts the device run) unless the block is
    /// non-fatal, in which case it is logged and the sequence goes on. The
    /// `<next>-0` record does not advance the case counter.
    pub fn setup(&mut self, block: &SetupBlock) -> Result<(), StepError> {
        info!(device = %self.recorder.device_label(), "setup: {}", block.name);
        let err = match self.run_steps(&block.steps) {
            Ok(()) => return Ok(()),
            Err(e) => StepError::Setup {
                block: block.name.clone(),
                source: Box::new(e),
            },
        };

        if let Some(info) = &block.record_failure_as {
            let number = format!("{}-0", self.next_number);
            self.recorder
                .record(Some(self.driver), number, info, StepOutcome::Fail, Some(&err));
        }
        if block.fatal {
            Err(err)
        } else {
            warn!(device = %self.recorder.device_label(), "{}, continuing", err);
            Ok(())
        }
    }

    /// Run one declared case and record its outcome
    pub fn case(&mut self, case: &CaseSpec) -> StepOutcome {
        self.run_case_with(&case.info, |runner| runner.run_steps(&case.steps))
    }

    /// Run a case body and record PASS, or FAIL with the error. Never aborts.
    pub fn run_case_with<F>(&mut self, info: &CaseInfo, body: F) -> StepOutcome
    where
        F: FnOnce(&Self) -> Result<(), StepError>,
    {
        let number = self.next_number;
        self.next_number += 1;

        let result = body(&*self);
        let outcome = if result.is_ok() {
            StepOutcome::Pass
        } else {
            StepOutcome::Fail
        };
        let cause = result.as_ref().err();
        self.recorder.record(
            Some(self.driver),
            number.to_string(),
            info,
            outcome,
            cause.map(|e| e as &(dyn std::error::Error + 'static)),
        );
        outcome
    }

    /// Walk the suite sequence. Returns the first setup failure.
    pub fn run_suite(&mut self, suite: &Suite) -> Result<(), StepError> {
        for entry in &suite.sequence {
            match entry {
                Entry::Setup(block) => self.setup(block)?,
                Entry::Case(case) => {
                    self.case(case);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::webdriver::{Condition, ElementId, Point, Rect};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Screen with a fixed set of visible xpaths; records interactions
    struct FakeScreen {
        visible: HashSet<String>,
        log: Mutex<Vec<String>>,
        settings: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeScreen {
        fn new(visible: &[&str]) -> Self {
            Self {
                visible: visible.iter().map(|s| s.to_string()).collect(),
                log: Mutex::new(Vec::new()),
                settings: Mutex::new(Vec::new()),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn settings(&self) -> Vec<serde_json::Value> {
            self.settings.lock().unwrap().clone()
        }
    }

    impl UiDriver for FakeScreen {
        fn find(&self, locator: &Locator) -> DriverResult<ElementId> {
            if self.visible.contains(locator.value()) {
                Ok(ElementId(locator.value().to_string()))
            } else {
                Err(DriverError::NoSuchElement(locator.to_string()))
            }
        }
        fn is_displayed(&self, _: &ElementId) -> DriverResult<bool> {
            Ok(true)
        }
        fn is_enabled(&self, _: &ElementId) -> DriverResult<bool> {
            Ok(true)
        }
        fn click(&self, e: &ElementId) -> DriverResult<()> {
            self.log.lock().unwrap().push(format!("click {}", e.0));
            Ok(())
        }
        fn clear(&self, e: &ElementId) -> DriverResult<()> {
            self.log.lock().unwrap().push(format!("clear {}", e.0));
            Ok(())
        }
        fn send_keys(&self, e: &ElementId, text: &str) -> DriverResult<()> {
            self.log.lock().unwrap().push(format!("keys {} {}", e.0, text));
            Ok(())
        }
        fn screenshot(&self) -> DriverResult<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
        }
        fn swipe(&self, _: Point, _: Point, _: Duration) -> DriverResult<()> {
            self.log.lock().unwrap().push("swipe".into());
            Ok(())
        }
        fn tap(&self, _: Point) -> DriverResult<()> {
            Ok(())
        }
        fn press_keycode(&self, code: u32) -> DriverResult<()> {
            self.log.lock().unwrap().push(format!("key {}", code));
            Ok(())
        }
        fn rect(&self, _: &ElementId) -> DriverResult<Rect> {
            Ok(Rect { x: 40, y: 300, width: 200, height: 200 })
        }
        fn update_settings(&self, settings: serde_json::Value) -> DriverResult<()> {
            self.settings.lock().unwrap().push(settings);
            Ok(())
        }
    }

    fn fast_waits() -> WaitSettings {
        WaitSettings {
            short: Duration::from_millis(30),
            long: Duration::from_millis(30),
            launch: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            command_timeout: Duration::from_secs(1),
        }
    }

    fn visible(xpath: &str) -> Step {
        Action::WaitVisible {
            locator: Locator::xpath(xpath),
            timeout: Tier::Short,
        }
        .into()
    }

    fn case(expected: &str, steps: Vec<Step>) -> Entry {
        Entry::Case(CaseSpec {
            info: CaseInfo::new("Entry page", expected),
            steps,
        })
    }

    #[test]
    fn test_failed_case_does_not_abort() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//a", "//c"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let suite = Suite {
            name: "s".into(),
            app_name: None,
            app_package: None,
            sequence: vec![
                case("a", vec![visible("//a")]),
                case("b", vec![visible("//b")]),
                case("c", vec![visible("//c")]),
            ],
        };

        let mut runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        runner.run_suite(&suite).unwrap();
        assert_eq!(runner.next_number(), 4);

        let outcomes: Vec<_> = recorder
            .results()
            .iter()
            .map(|r| (r.number.as_str(), r.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![("1", StepOutcome::Pass), ("2", StepOutcome::Fail), ("3", StepOutcome::Pass)]
        );
        let trace = &recorder.results()[1].failure.as_ref().unwrap().error_trace;
        assert!(trace.starts_with("step 1 (wait visible xpath=//b) failed"));
        assert!(trace.contains(&Condition::Visible.to_string()));
    }

    #[test]
    fn test_setup_failure_aborts_and_records_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//a"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let suite = Suite {
            name: "s".into(),
            app_name: None,
            app_package: None,
            sequence: vec![
                case("a", vec![visible("//a")]),
                Entry::Setup(SetupBlock {
                    name: "permission guide".into(),
                    steps: vec![visible("//guide")],
                    record_failure_as: Some(CaseInfo::new("Permissions", "Guide page is shown")),
                    fatal: true,
                }),
                case("never", vec![visible("//a")]),
            ],
        };

        let mut runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        let err = runner.run_suite(&suite).unwrap_err();
        assert!(matches!(err, StepError::Setup { ref block, .. } if block == "permission guide"));

        let numbers: Vec<_> = recorder.results().iter().map(|r| r.number.clone()).collect();
        assert_eq!(numbers, vec!["1", "2-0"]);
        assert_eq!(recorder.results()[1].outcome, StepOutcome::Fail);
    }

    #[test]
    fn test_non_fatal_setup_records_placeholder_and_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//a", "//start"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let suite = Suite {
            name: "s".into(),
            app_name: None,
            app_package: None,
            sequence: vec![
                case("a", vec![visible("//a")]),
                Entry::Setup(SetupBlock {
                    name: "permission guide".into(),
                    steps: vec![visible("//guide")],
                    record_failure_as: Some(CaseInfo::new("Permissions", "Guide page is shown")),
                    fatal: false,
                }),
                Entry::Setup(SetupBlock {
                    name: "start button".into(),
                    steps: vec![
                        Action::Tap {
                            locator: Locator::xpath("//start"),
                            timeout: Tier::Long,
                        }
                        .into(),
                    ],
                    record_failure_as: None,
                    fatal: true,
                }),
                case("b", vec![visible("//a")]),
            ],
        };

        let mut runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        runner.run_suite(&suite).unwrap();

        let outcomes: Vec<_> = recorder
            .results()
            .iter()
            .map(|r| (r.number.as_str(), r.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![("1", StepOutcome::Pass), ("2-0", StepOutcome::Fail), ("2", StepOutcome::Pass)]
        );
        assert!(screen.log().contains(&"click //start".to_string()));
        let trace = &recorder.results()[1].failure.as_ref().unwrap().error_trace;
        assert!(trace.starts_with("setup 'permission guide' failed"));
    }

    #[test]
    fn test_optional_setup_step_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//home"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let block = SetupBlock {
            name: "walkthrough".into(),
            steps: vec![
                Step {
                    action: Action::WaitVisible {
                        locator: Locator::xpath("//walkthrough"),
                        timeout: Tier::Short,
                    },
                    optional: true,
                },
                Action::Swipe {
                    from: Point::new(958, 1065),
                    to: Point::new(213, 1069),
                    duration_ms: 10,
                }
                .into(),
                Action::Tap {
                    locator: Locator::xpath("//home"),
                    timeout: Tier::Long,
                }
                .into(),
            ],
            record_failure_as: None,
            fatal: true,
        };

        let mut runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        runner.setup(&block).unwrap();
        assert_eq!(screen.log(), vec!["swipe", "click //home"]);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_image_wait_scopes_and_resets_search_area() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//avatar", "avatar.jpg"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        runner
            .perform(&Action::WaitImage {
                image: "avatar.jpg".into(),
                within: Some(Locator::xpath("//avatar")),
                timeout: Tier::Short,
            })
            .unwrap();
        assert_eq!(
            screen.settings(),
            vec![
                json!({ "imageElementRect": { "left": 40, "top": 300, "width": 200, "height": 200 } }),
                json!({ "imageElementRect": {} }),
            ]
        );
    }

    #[test]
    fn test_image_wait_resets_search_area_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//avatar"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        let err = runner
            .perform(&Action::WaitImage {
                image: "other.jpg".into(),
                within: Some(Locator::xpath("//avatar")),
                timeout: Tier::Short,
            })
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { condition: Condition::Present, .. }));
        assert_eq!(screen.settings().last(), Some(&json!({ "imageElementRect": {} })));

        // the scoping element itself is missing
        let screen = FakeScreen::new(&[]);
        let runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        assert!(runner
            .perform(&Action::WaitImage {
                image: "avatar.jpg".into(),
                within: Some(Locator::xpath("//avatar")),
                timeout: Tier::Short,
            })
            .is_err());
        assert_eq!(screen.settings(), vec![json!({ "imageElementRect": {} })]);
    }

    #[test]
    fn test_type_clears_then_sends() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&["//input"]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        runner
            .perform(&Action::Type {
                locator: Locator::xpath("//input"),
                text: "날씨".into(),
                clear: true,
                timeout: Tier::Short,
            })
            .unwrap();
        runner.perform(&Action::Back).unwrap();
        assert_eq!(
            screen.log(),
            vec!["click //input", "clear //input", "keys //input 날씨", "key 4"]
        );
    }

    #[test]
    fn test_run_case_with_check_error() {
        let tmp = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(&[]);
        let mut recorder = ResultRecorder::new("S20", ArtifactStore::new(tmp.path()));
        let mut runner = CaseRunner::new(&screen, &mut recorder, fast_waits());
        let outcome = runner.run_case_with(&CaseInfo::new("Search", "Result count > 0"), |_| {
            Err(StepError::Check("result list is empty".into()))
        });
        assert_eq!(outcome, StepOutcome::Fail);
        assert_eq!(
            recorder.results()[0].failure.as_ref().unwrap().error_trace,
            "result list is empty"
        );
    }
}
