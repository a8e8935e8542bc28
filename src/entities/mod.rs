pub mod material_requirement;
pub mod nomenclature_item;
pub mod project_demand_line;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_level;
