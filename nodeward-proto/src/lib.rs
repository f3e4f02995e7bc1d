//! nodeward protocol definitions
//!
//! Messages and clients for the subset of the node-agent API that nodeward
//! consumes, generated from `proto/` at build time.

pub mod common {
    #![allow(clippy::all)]
    #![allow(warnings)]
    tonic::include_proto!("common");
}

pub mod machine {
    #![allow(clippy::all)]
    #![allow(warnings)]
    tonic::include_proto!("machine");

    pub use machine_service_client::MachineServiceClient;
}

pub mod time {
    #![allow(clippy::all)]
    #![allow(warnings)]
    tonic::include_proto!("time");

    pub use time_service_client::TimeServiceClient;
}

// Resource state API
pub mod cosi {
    pub mod resource {
        #![allow(clippy::all)]
        #![allow(warnings)]
        tonic::include_proto!("cosi.resource");

        pub use state_client::StateClient;
    }
}
