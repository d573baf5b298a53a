// src/analysis.rs
//
// Сводки по событиям: общий баланс, баланс по контактам, отчёт по категориям,
// лента событий за период.

use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::{BTreeMap, HashMap};

use crate::db::contact::ContactRepo;
use crate::db::error::RepoError;
use crate::db::event::{Event, EventKind, EventRepo};

pub const CATEGORIES: [&str; 5] = ["gift", "wedding", "birthday", "funeral", "other"];
const FALLBACK_CATEGORY: &str = "other";

pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const DEFAULT_IMPORTANT_LIMIT: usize = 5;

/// Окно ленты событий.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    /// С воскресенья по субботу текущей недели.
    Week,
    Month,
    Year,
    /// 2000-01-01 ..= 2100-12-31
    All,
}

impl Period {
    /// Границы окна (включительно) относительно `today`.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Today => (today, today),
            Period::Week => {
                let back = u64::from(today.weekday().num_days_from_sunday());
                let start = today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
                (start, start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX))
            }
            Period::Month => {
                let start = today.with_day(1).unwrap_or(today);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(NaiveDate::MAX);
                (start, end)
            }
            Period::Year => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(NaiveDate::MIN),
                NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(NaiveDate::MAX),
            ),
            Period::All => (
                NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
                NaiveDate::from_ymd_opt(2100, 12, 31).unwrap_or(NaiveDate::MAX),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOverview {
    pub total_given: f64,
    pub total_received: f64,
    /// received - given
    pub net_balance: f64,
    /// given / received, 0 если ничего не получено
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactBalance {
    pub contact_id: String,
    pub name: String,
    pub total_given: f64,
    pub total_received: f64,
    pub balance: f64,
    pub event_count: usize,
    pub last_event_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTotals {
    pub given: f64,
    pub received: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub categories: BTreeMap<&'static str, CategoryTotals>,
    pub total_events: usize,
}

#[derive(Clone)]
pub struct Analysis {
    events: EventRepo,
    contacts: ContactRepo,
}

impl Analysis {
    pub fn new(events: EventRepo, contacts: ContactRepo) -> Self {
        Self { events, contacts }
    }

    pub async fn balance_overview(&self) -> Result<BalanceOverview, RepoError> {
        let events = self.events.get_events().await?;
        let (total_given, total_received) = events.iter().fold((0.0, 0.0), |(given, received), e| match e.kind {
            EventKind::Given => (given + e.amount, received),
            EventKind::Received => (given, received + e.amount),
        });
        Ok(BalanceOverview {
            total_given,
            total_received,
            net_balance: total_received - total_given,
            ratio: if total_received > 0.0 { total_given / total_received } else { 0.0 },
        })
    }

    /// Только контакты с событиями, по убыванию |balance|.
    /// События с неизвестным contact_id пропускаются.
    pub async fn contact_analysis(&self) -> Result<Vec<ContactBalance>, RepoError> {
        let mut by_contact: HashMap<String, ContactBalance> = self
            .contacts
            .get_contacts()
            .await?
            .into_iter()
            .map(|c| {
                let entry = ContactBalance {
                    contact_id: c.id.clone(),
                    name: c.name,
                    total_given: 0.0,
                    total_received: 0.0,
                    balance: 0.0,
                    event_count: 0,
                    last_event_date: None,
                };
                (c.id, entry)
            })
            .collect();

        for event in self.events.get_events().await? {
            let Some(entry) = by_contact.get_mut(&event.contact_id) else {
                continue;
            };
            entry.event_count += 1;
            match event.kind {
                EventKind::Given => entry.total_given += event.amount,
                EventKind::Received => entry.total_received += event.amount,
            }
            entry.last_event_date = entry.last_event_date.max(Some(event.date));
        }

        let mut result: Vec<ContactBalance> = by_contact
            .into_values()
            .filter(|c| c.event_count > 0)
            .map(|mut c| {
                c.balance = c.total_received - c.total_given;
                c
            })
            .collect();
        result.sort_by(|a, b| {
            b.balance
                .abs()
                .total_cmp(&a.balance.abs())
                .then_with(|| a.contact_id.cmp(&b.contact_id))
        });
        Ok(result)
    }

    /// Неизвестная или пустая категория считается как `other`.
    pub async fn category_report(&self) -> Result<CategoryReport, RepoError> {
        let events = self.events.get_events().await?;
        let mut categories: BTreeMap<&'static str, CategoryTotals> =
            CATEGORIES.iter().map(|c| (*c, CategoryTotals::default())).collect();

        for event in &events {
            let totals = categories.entry(category_of(event)).or_default();
            match event.kind {
                EventKind::Given => totals.given += event.amount,
                EventKind::Received => totals.received += event.amount,
            }
            totals.count += 1;
        }

        Ok(CategoryReport {
            categories,
            total_events: events.len(),
        })
    }

    /// События в интервале (today, today + days], ближайшие первыми.
    pub async fn upcoming_events(&self, today: NaiveDate, days: u32) -> Result<Vec<Event>, RepoError> {
        let until = today.checked_add_days(Days::new(u64::from(days))).unwrap_or(NaiveDate::MAX);
        let mut upcoming: Vec<Event> = self
            .events
            .get_events()
            .await?
            .into_iter()
            .filter(|e| e.date > today && e.date <= until)
            .collect();
        upcoming.sort_by_key(|e| e.date);
        Ok(upcoming)
    }

    /// События внутри окна `period`, новые первыми.
    pub async fn event_timeline(&self, today: NaiveDate, period: Period) -> Result<Vec<Event>, RepoError> {
        let (start, end) = period.date_range(today);
        let mut timeline: Vec<Event> = self
            .events
            .get_events()
            .await?
            .into_iter()
            .filter(|e| e.date >= start && e.date <= end)
            .collect();
        timeline.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(timeline)
    }

    /// `limit` самых свежих событий.
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<Event>, RepoError> {
        let mut events = self.events.get_events().await?;
        events.sort_by(|a, b| b.date.cmp(&a.date));
        events.truncate(limit);
        Ok(events)
    }

    /// `limit` контактов с наибольшим |balance|.
    pub async fn important_contacts(&self, limit: usize) -> Result<Vec<ContactBalance>, RepoError> {
        let mut contacts = self.contact_analysis().await?;
        contacts.truncate(limit);
        Ok(contacts)
    }
}

fn category_of(event: &Event) -> &'static str {
    event
        .category
        .as_deref()
        .and_then(|c| CATEGORIES.iter().copied().find(|known| *known == c))
        .unwrap_or(FALLBACK_CATEGORY)
}
