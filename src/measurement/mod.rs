pub mod calibration;
pub mod engine;
pub mod validate;

pub use calibration::{AdultStandard, CalibrationEntry, CalibrationError, CalibrationTable};
pub use engine::{MeasureError, MeasurementEngine, MeasurementSet, Scale};
pub use validate::{
    MeasurementValidator, StandardStatus, ValidatedMeasurement, ValidationFlag, ValidationReport,
};
