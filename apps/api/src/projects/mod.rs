// Project lifecycle: create, inspect, configure section mapping and template, delete.

pub mod handlers;
