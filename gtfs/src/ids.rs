use serde::{Deserialize, Serialize};

// All of these are the original string IDs from the feed. Nothing here is big enough to bother
// with cheap numeric IDs.
macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(StopID);
string_id!(TripID);
string_id!(RouteID);
string_id!(ServiceID);
string_id!(ShapeID);
// trip_short_name. This is what the realtime feed calls a DatedVehicleJourneyRef.
string_id!(TripName);
