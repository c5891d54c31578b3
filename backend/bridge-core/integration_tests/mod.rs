mod bridge_tests {
    pub mod helpers;

    mod cancellation;
    mod connection;
    mod properties;
    mod scenarios;
    mod websocket;
}
