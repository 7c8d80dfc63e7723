use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

// ── Effective windows ─────────────────────────────────────────────

/// A team member's own windows for `date`.
///
/// Specific-date rules for that date OVERRIDE the weekly pattern entirely;
/// otherwise the recurring rules for the weekday apply. Sorted and merged.
pub fn member_windows(rules: &[AvailabilityRule], date: NaiveDate) -> Vec<Window> {
    let specific: Vec<Window> = rules
        .iter()
        .filter(|r| matches!(r.kind, RuleKind::SpecificDate { specific_date } if specific_date == date))
        .map(|r| r.window)
        .collect();

    let mut windows = if specific.is_empty() {
        let dow = day_of_week(date);
        rules
            .iter()
            .filter(|r| matches!(r.kind, RuleKind::Recurring { day_of_week } if day_of_week == dow))
            .map(|r| r.window)
            .collect()
    } else {
        specific
    };

    windows.sort_by_key(|w| w.start);
    merge_windows(&windows)
}

/// A shop's operating windows for `date`.
///
/// Any active special-hours entry matching the date replaces working hours
/// for that day; a closed one yields no windows at all.
pub fn shop_windows(hours: &ShopHours, date: NaiveDate) -> Vec<Window> {
    let mut special: Vec<&SpecialHours> = hours
        .special
        .iter()
        .filter(|s| s.is_active && s.applies_to(date))
        .collect();

    let mut windows: Vec<Window> = if special.is_empty() {
        let dow = day_of_week(date);
        let mut working: Vec<&WorkingHours> = hours
            .working
            .iter()
            .filter(|w| w.is_active && w.day_of_week == dow)
            .collect();
        working.sort_by_key(|w| w.slot_order);
        working.iter().map(|w| w.window).collect()
    } else {
        if special.iter().any(|s| s.is_closed()) {
            return Vec::new();
        }
        special.sort_by_key(|s| s.slot_order);
        special.iter().filter_map(|s| s.window).collect()
    };

    windows.sort_by_key(|w| w.start);
    merge_windows(&windows)
}

/// Merge sorted windows that overlap or touch (9–12 + 12–15 → 9–15).
pub fn merge_windows(sorted: &[Window]) -> Vec<Window> {
    let mut merged: Vec<Window> = Vec::new();
    for &w in sorted {
        if let Some(last) = merged.last_mut()
            && w.start <= last.end
        {
            last.end = last.end.max(w.end);
            continue;
        }
        merged.push(w);
    }
    merged
}

/// Intersection of two sorted, disjoint window lists (two-pointer sweep).
pub fn intersect_windows(a: &[Window], b: &[Window]) -> Vec<Window> {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start < end {
            result.push(Window::new(start, end));
        }
        // Advance whichever ends first; it cannot meet anything further on the other side.
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

impl Engine {
    pub async fn effective_windows(&self, team_member_id: Ulid, date: NaiveDate) -> Result<Vec<Window>, EngineError> {
        let rules = self.repo.find_availability_rules(team_member_id).await?;
        Ok(member_windows(&rules, date))
    }

    pub async fn shop_windows(&self, shop_id: Ulid, date: NaiveDate) -> Result<Vec<Window>, EngineError> {
        let hours = self.repo.find_shop_hours(shop_id).await?;
        Ok(shop_windows(&hours, date))
    }

    /// Where the member is available AND the shop is open.
    pub async fn bookable_windows(
        &self,
        team_member_id: Ulid,
        shop_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Window>, EngineError> {
        let member = self.effective_windows(team_member_id, date).await?;
        if member.is_empty() {
            return Ok(member);
        }
        let shop = self.shop_windows(shop_id, date).await?;
        Ok(intersect_windows(&member, &shop))
    }
}
