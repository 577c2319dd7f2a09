use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DateError {
    #[error("Invalid month ({0})")]
    InvalidMonth(u32),
    #[error("Invalid day ({0})")]
    InvalidDay(u32),
}

/// Errors raised while reading input or parameter files.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("The input file '{0}' does not exist or cannot be opened")]
    CannotOpen(String),
    #[error("File '{0}': the header is malformed")]
    MalformedHeader(String),
    #[error("File '{0}': {1}")]
    InvalidDate(String, DateError),
    #[error("File '{0}': invalid date format in the header")]
    InvalidDateFormat(String),
    #[error("File '{0}': the number of columns ({1}) is less than the number of input variables ({2})")]
    TooFewColumns(String, usize, usize),
    #[error("File '{0}': incomplete line found: {1}")]
    IncompleteLine(String, String),
    #[error("Parameters loaded from file '{0}' do not match the model type")]
    ParameterMismatch(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised when a model is fed, run or scored.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Variables are not initialized for the model run")]
    VariablesNotInitialized,
    #[error("The input series cannot be empty")]
    EmptySeries,
    #[error("All input series must have the same length")]
    MismatchedSeriesLength,
    #[error("Variables needed for the model run are not complete (P, T, PET required)")]
    MissingRunInputs,
    #[error("Variables of water use needed for the model run are not complete (POD, POV, PVN, VYP required)")]
    MissingWaterUseInputs,
    #[error("Observed runoff needed for optimization is missing")]
    MissingObservedRunoff,
    #[error("Observed baseflow needed for optimization is missing")]
    MissingObservedBaseflow,
    #[error("Temperature needed for the PET estimation is missing")]
    MissingTemperature,
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("The date {0} is outside the data period")]
    DateOutsideSeries(String),
    #[error("The date {0} is not contained in the time series")]
    DateNotInSeries(String),
    #[error("The optimization criterion value is not finite (likely a zero observed or modelled value)")]
    CriterionNotFinite,
    #[error("Too short time-series to calculate monthly values of variables")]
    SeriesTooShort,
}

/// Errors raised when an optimization is configured or started.
#[derive(Error, Debug)]
pub enum OptimError {
    #[error("The number of parameters cannot be zero")]
    NoParameters,
    #[error("The number of complexes cannot be zero")]
    NoComplexes,
    #[error("The number of members in one complex cannot be zero")]
    EmptyComplex,
    #[error("The number of ensemble runs cannot be zero")]
    NoEnsembles,
    #[error("One complex is too small to draw {0} distinct members from it")]
    ComplexTooSmall(usize),
    #[error("The weight for baseflow must be between 0 and 1")]
    WeightOutOfRange,
    #[error("The initial groundwater storage must be non-negative")]
    NegativeInitialStorage,
    #[error("Initial value of parameter '{0}' is too close to its lower limit")]
    TooCloseToLowerBound(String),
    #[error("Initial value of parameter '{0}' is too close to its upper limit")]
    TooCloseToUpperBound(String),
    #[error("The system contains no catchment to optimize")]
    NoCatchments,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised while writing result files.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("The output file '{0}' cannot be used")]
    CannotWrite(String),
    #[error("No variables to output")]
    NoData,
    #[error("Daily series cannot be written for a monthly model")]
    DailySeriesForMonthly,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("A file cannot be exported because {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
