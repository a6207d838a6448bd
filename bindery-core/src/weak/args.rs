//! Standard event names and argument types

/// Raised after an observable property changed
pub const PROPERTY_CHANGED: &str = "PropertyChanged";

/// Raised after the error list of a property changed
pub const ERRORS_CHANGED: &str = "ErrorsChanged";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyChangedArgs {
    pub property: String,
}

impl PropertyChangedArgs {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorsChangedArgs {
    pub property: String,
}

impl ErrorsChangedArgs {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}
