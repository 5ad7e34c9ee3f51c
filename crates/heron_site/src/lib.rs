//! Per-partition execution site: the priority task queue and the
//! single-threaded runner that drains it.
//!
//! One site owns one partition's execution context. Producers on any
//! thread hand work to the site through [`tasker::SiteTaskerQueue`]; the
//! [`runner::SiteRunner`] thread is the only consumer and the only code
//! that ever touches the context.

pub mod runner;
pub mod tasker;
