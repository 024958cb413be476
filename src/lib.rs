//! # Review Lens
//!
//! Collects Apple App Store reviews for an app and turns them into rating
//! metrics, sentiment insights and reports.
//!
//! Reviews come from one of two upstream sources (the store's web reviews
//! API, or the public iTunes customer-reviews RSS feed) with automatic
//! fallback, are cleaned and sampled, and are stored in SQLite keyed by
//! `(app_id, country, review_id)`. Everything downstream reads from the
//! store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Sources    │──▶│ Clean+Sample│──▶│  SQLite   │
//! │ Scraper/RSS  │   │   (fetch)   │   │ (store)   │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!                                           │
//!                ┌──────────────┬───────────┤
//!                ▼              ▼           ▼
//!          ┌──────────┐  ┌──────────┐ ┌──────────┐
//!          │ metrics  │  │ insights │ │  report  │
//!          └──────────┘  └──────────┘ └──────────┘
//!                        served by the CLI (rlens) and HTTP API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rlens init                               # create database
//! rlens collect 310633997 --how-many 200   # fetch and store reviews
//! rlens metrics 310633997
//! rlens insights 310633997
//! rlens report 310633997                   # write report_310633997_us.html
//! rlens serve                              # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Domain error type |
//! | [`text`] | Review text cleaning |
//! | [`fetch`] | Upstream sources, fallback and sampling |
//! | [`collect`] | Fetch then store |
//! | [`store`] | Review persistence |
//! | [`metrics`] | Mean rating and histogram |
//! | [`sentiment`] | Sentiment classifier abstraction |
//! | [`keywords`] | Keyword extraction |
//! | [`insights`] | Sentiment, keywords, recommendations |
//! | [`chart`] | PNG bar charts |
//! | [`report`] | JSON / CSV / HTML rendering |
//! | [`server`] | HTTP API |
//! | [`stats`] | Database overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chart;
pub mod collect;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod insights;
pub mod keywords;
pub mod metrics;
pub mod migrate;
pub mod models;
pub mod report;
pub mod sentiment;
pub mod server;
pub mod stats;
pub mod store;
pub mod text;
