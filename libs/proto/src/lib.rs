pub mod agent {
    pub mod v1 {
        include!("gen/salvor.agent.v1.rs");

        pub use salvor_agent_client::SalvorAgentClient;
        pub use salvor_agent_server::{SalvorAgent, SalvorAgentServer};
    }
}
