//! The steps of the adaptive ensemble Kalman filter.
//!
//! [`forecast`] advances the ensemble through the dynamics, [`ensemble`] provides its statistics,
//! [`adaptive`] re-estimates the process noise and [`analysis`] assimilates an observation.

pub mod ensemble;
pub mod forecast;
pub mod adaptive;
pub mod analysis;
