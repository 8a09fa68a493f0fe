pub mod logical_plan;
