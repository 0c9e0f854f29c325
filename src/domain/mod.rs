// 領域模型與 ports，不依賴任何 adapter

pub mod model;
pub mod ports;
