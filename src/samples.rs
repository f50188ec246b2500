//! Sample report definitions and data for testing and demonstration.
//!
//! Each sample exercises a different part of the band runner. Definitions
//! and data are JSON so they double as documentation of the input format.

/// Orders grouped by customer, with a title, page header/footer and a
/// summary. Runs double pass so the footer can print `[TotalPages]`.
pub fn invoice_report() -> &'static str {
    r##"{
    "name": "invoices",
    "double_pass": true,
    "pages": [{
        "name": "Invoices",
        "paper_width": 595.28,
        "paper_height": 841.89,
        "report_title": {
            "name": "Title", "height": 40,
            "objects": [{"type": "text", "name": "TitleText", "text": "Orders by customer"}]
        },
        "page_header": {
            "name": "PageHeader", "height": 20,
            "objects": [{"type": "text", "name": "HeaderText", "text": "Order list"}]
        },
        "page_footer": {
            "name": "PageFooter", "height": 20,
            "objects": [{"type": "text", "name": "PageNo", "text": "Page [Page] of [TotalPages]"}]
        },
        "report_summary": {
            "name": "Summary", "height": 30,
            "objects": [{"type": "text", "name": "SummaryText", "text": "End of report"}]
        },
        "bands": [{
            "name": "CustomerHeader", "height": 24,
            "keep": {"keep_with_data": true},
            "objects": [{"type": "text", "name": "Customer", "text": "[customer]"}],
            "kind": {
                "type": "group_header",
                "condition": "customer",
                "footer": {
                    "name": "CustomerFooter", "height": 18,
                    "objects": [{"type": "text", "name": "CustomerTotal", "text": "Total for [customer]"}]
                },
                "body": {
                    "name": "OrderLine", "height": 18,
                    "objects": [
                        {"type": "text", "name": "Item", "left": 0, "text": "[item]"},
                        {"type": "text", "name": "Amount", "left": 300, "text": "[amount]"}
                    ],
                    "kind": {"type": "data", "data_source": "orders"}
                }
            }
        }]
    }]
}"##
}

/// Data for [`invoice_report`].
pub fn invoice_data() -> &'static str {
    r##"{
    "orders": {
        "columns": ["customer", "item", "amount"],
        "rows": [
            ["Acme", "Web development", 6000],
            ["Acme", "Design services", 2500],
            ["Acme", "Hosting", 500],
            ["Globex", "Consulting", 1200],
            ["Globex", "Training", 800],
            ["Initech", "Licenses", 4300]
        ]
    }
}"##
}

/// Product labels printed down-then-across in three columns.
pub fn catalog_report() -> &'static str {
    r##"{
    "name": "catalog",
    "pages": [{
        "name": "Catalog",
        "paper_width": 420,
        "paper_height": 300,
        "margins": {"left": 10, "top": 10, "right": 10, "bottom": 10},
        "bands": [{
            "name": "Label", "height": 40, "width": 130,
            "objects": [{"type": "text", "name": "Product", "text": "[sku] [name]"}],
            "kind": {
                "type": "data",
                "data_source": "products",
                "columns": {"count": 3, "width": 133, "layout": "down_then_across"},
                "header": {"name": "CatalogHeader", "height": 20,
                           "keep": {"keep_with_data": true}}
            }
        }]
    }]
}"##
}

/// Data for [`catalog_report`].
pub fn catalog_data() -> &'static str {
    r##"{
    "products": [
        {"sku": "A-1", "name": "Bolt"},
        {"sku": "A-2", "name": "Nut"},
        {"sku": "A-3", "name": "Washer"},
        {"sku": "B-1", "name": "Hinge"},
        {"sku": "B-2", "name": "Bracket"},
        {"sku": "C-1", "name": "Screw"},
        {"sku": "C-2", "name": "Anchor"}
    ]
}"##
}

/// An employee tree printed from id / manager-id columns.
pub fn org_chart_report() -> &'static str {
    r##"{
    "name": "org-chart",
    "pages": [{
        "name": "Org",
        "bands": [{
            "name": "Employee", "height": 16,
            "objects": [{"type": "text", "name": "EmployeeName", "text": "[name]"}],
            "kind": {
                "type": "data",
                "data_source": "staff",
                "hierarchy": {"id_column": "id", "parent_id_column": "manager", "indent": 12}
            }
        }]
    }]
}"##
}

/// Data for [`org_chart_report`].
pub fn org_chart_data() -> &'static str {
    r##"{
    "staff": [
        {"id": 1, "manager": null, "name": "Grace"},
        {"id": 2, "manager": 1, "name": "Alan"},
        {"id": 3, "manager": 1, "name": "Edsger"},
        {"id": 4, "manager": 2, "name": "Barbara"}
    ]
}"##
}

/// The smallest useful definition: one fixed band.
pub fn minimal_report() -> &'static str {
    r##"{
    "name": "minimal",
    "pages": [{"name": "Page1", "bands": [{"name": "Hello", "height": 20}]}]
}"##
}

/// Every sample as `(name, report, data)`.
pub fn all_samples() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("invoice", invoice_report(), invoice_data()),
        ("catalog", catalog_report(), catalog_data()),
        ("org-chart", org_chart_report(), org_chart_data()),
        ("minimal", minimal_report(), "{}"),
    ]
}
