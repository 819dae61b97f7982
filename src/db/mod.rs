pub mod driver;
pub mod mysql;
pub mod value;

pub use driver::Driver;
pub use driver::DriverConnection;
pub use mysql::MySqlDriver;
pub use value::QueryRequest;
pub use value::QueryResult;
pub use value::Row;
pub use value::Value;
