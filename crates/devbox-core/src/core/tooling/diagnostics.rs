pub mod commands {
    pub const LOCK: &str = "DBX101";
    pub const VERIFY: &str = "DBX201";
    pub const APPLY: &str = "DBX301";
    pub const PROJECT: &str = "DBX401";
    pub const SANDBOX: &str = "DBX901";
    pub const BACKEND: &str = "DBX903";
}
