//! Single-slot player notice banner.
//!
//! The session surfaces at most one message at a time. Event banners
//! outrank routine messages and hold the slot until they expire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fixed::Millis;
use crate::progress::Unlock;

/// How long a routine notice stays up.
pub const NOTICE_MS: Millis = 4_000;
/// Event banners linger longer.
pub const EVENT_NOTICE_MS: Millis = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoticeKind {
    PeakHourStarted,
    PeakHourEnded,
    LowDemandStarted,
    LowDemandEnded,
    StormWarning,
    TyphoonWarning,
    DisasterPassed,
    MaintenanceOutage,
    MaintenanceComplete,
    NuclearFailure,
    NuclearCoolingLow,
    WireBurned,
    PylonDamaged,
    PatienceCritical,
    NewDemand,
    CleanSubsidy,
    Unlocked(Unlock),
}

impl NoticeKind {
    pub fn severity(&self) -> Severity {
        match self {
            NoticeKind::StormWarning
            | NoticeKind::TyphoonWarning
            | NoticeKind::NuclearFailure
            | NoticeKind::WireBurned => Severity::Alert,
            NoticeKind::NuclearCoolingLow
            | NoticeKind::PylonDamaged
            | NoticeKind::PatienceCritical
            | NoticeKind::MaintenanceOutage => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Event banners claim the slot and refuse routine replacements.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            NoticeKind::PeakHourStarted
                | NoticeKind::LowDemandStarted
                | NoticeKind::StormWarning
                | NoticeKind::TyphoonWarning
        )
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NoticeKind::PeakHourStarted => "Peak hour! Demand surges across the grid",
            NoticeKind::PeakHourEnded => "Peak hour is over",
            NoticeKind::LowDemandStarted => "Low demand period, a good time to charge batteries",
            NoticeKind::LowDemandEnded => "Demand is back to normal",
            NoticeKind::StormWarning => "A storm is battering the network",
            NoticeKind::TyphoonWarning => "Typhoon! Pylons are at serious risk",
            NoticeKind::DisasterPassed => "The weather has cleared",
            NoticeKind::MaintenanceOutage => "A plant went down for maintenance",
            NoticeKind::MaintenanceComplete => "Maintenance complete, output improved",
            NoticeKind::NuclearFailure => "A reactor has failed and needs repair",
            NoticeKind::NuclearCoolingLow => "A reactor is short on battery cooling",
            NoticeKind::WireBurned => "A wire burned out from overload",
            NoticeKind::PylonDamaged => "A pylon was damaged",
            NoticeKind::PatienceCritical => "Customers are about to leave the grid",
            NoticeKind::NewDemand => "New demand has appeared",
            NoticeKind::CleanSubsidy => "Clean energy subsidy received",
            NoticeKind::Unlocked(u) => {
                return write!(f, "{}", unlock_message(*u));
            }
        };
        f.write_str(msg)
    }
}

fn unlock_message(unlock: Unlock) -> &'static str {
    match unlock {
        Unlock::Pioneer => "Achievement: Grid Pioneer. Bonus funds awarded",
        Unlock::CleanEnergyMaster => "Achievement: Clean Energy Master. Renewables are cheaper",
        Unlock::CrisisExpert => "Achievement: Crisis Expert. Repair stations are cheaper",
        Unlock::SmartGrid => "Tech unlocked: Smart Grid",
        Unlock::NuclearTech => "Tech unlocked: reactors fail less often",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub severity: Severity,
    pub shown_at: Millis,
    pub duration: Millis,
}

impl Notice {
    pub fn expired(&self, now: Millis) -> bool {
        now >= self.shown_at + self.duration
    }
}

/// Holds the one visible notice, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeLog {
    current: Option<Notice>,
}

impl NoticeLog {
    pub fn post(&mut self, kind: NoticeKind, now: Millis) {
        if let Some(current) = &self.current {
            if current.kind.is_event() && !kind.is_event() && !current.expired(now) {
                return;
            }
        }
        let duration = if kind.is_event() {
            EVENT_NOTICE_MS
        } else {
            NOTICE_MS
        };
        self.current = Some(Notice {
            severity: kind.severity(),
            kind,
            shown_at: now,
            duration,
        });
    }

    /// Drops the notice once its time is up.
    pub fn tick(&mut self, now: Millis) {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|current| current.expired(now));
        if expired {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Test 1: routine notices replace each other ----
    #[test]
    fn routine_replaces_routine() {
        let mut log = NoticeLog::default();
        log.post(NoticeKind::NewDemand, 0);
        log.post(NoticeKind::CleanSubsidy, 100);
        assert_eq!(log.current().map(|n| n.kind.clone()), Some(NoticeKind::CleanSubsidy));
    }

    // ---- Test 2: an active event banner blocks routine notices ----
    #[test]
    fn event_holds_the_slot() {
        let mut log = NoticeLog::default();
        log.post(NoticeKind::StormWarning, 0);
        log.post(NoticeKind::NewDemand, 1_000);
        assert_eq!(
            log.current().map(|n| n.kind.clone()),
            Some(NoticeKind::StormWarning)
        );
        // Another event may replace it.
        log.post(NoticeKind::TyphoonWarning, 2_000);
        assert_eq!(
            log.current().map(|n| n.kind.clone()),
            Some(NoticeKind::TyphoonWarning)
        );
    }

    // ---- Test 3: expired banners yield to anything ----
    #[test]
    fn expired_event_yields() {
        let mut log = NoticeLog::default();
        log.post(NoticeKind::StormWarning, 0);
        log.post(NoticeKind::NewDemand, EVENT_NOTICE_MS);
        assert_eq!(log.current().map(|n| n.kind.clone()), Some(NoticeKind::NewDemand));
    }

    // ---- Test 4: tick sweeps the slot ----
    #[test]
    fn tick_expires() {
        let mut log = NoticeLog::default();
        log.post(NoticeKind::NewDemand, 0);
        log.tick(NOTICE_MS - 1);
        assert!(log.current().is_some());
        log.tick(NOTICE_MS);
        assert!(log.current().is_none());
    }

    // ---- Test 5: severities and messages ----
    #[test]
    fn severity_and_text() {
        assert_eq!(NoticeKind::WireBurned.severity(), Severity::Alert);
        assert_eq!(NoticeKind::PylonDamaged.severity(), Severity::Warning);
        assert_eq!(NoticeKind::CleanSubsidy.severity(), Severity::Info);
        assert!(NoticeKind::StormWarning.to_string().contains("storm"));
        assert!(
            NoticeKind::Unlocked(Unlock::Pioneer)
                .to_string()
                .contains("Pioneer")
        );
    }
}
