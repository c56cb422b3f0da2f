mod common;

use common::{TestWorkspace, fixture_path, run_json, run_json_with};
use serde_json::json;
use table_scout::{
    config::Config,
    tools::{self, RunCodeRequest},
};

#[test]
fn table_results_are_capped_and_report_their_shape() {
    let config = Config {
        output_record_cap: 3,
        ..Config::default()
    };
    let response = run_json_with(&config, &fixture_path("sales.csv"), "result = df");
    assert_eq!(response["success"], true);
    assert_eq!(response["kind"], "table");
    assert_eq!(response["shape"], json!([8, 5]));
    assert_eq!(response["records"].as_array().expect("records").len(), 3);
    assert_eq!(response["truncated"], true);
    assert_eq!(
        response["columns"],
        json!(["Region", "Product", "Sales", "Units", "Date"])
    );
}

#[test]
fn derived_columns_flow_into_the_result() {
    let code = "df['Revenue'] = df['Sales'] * df['Units']\nresult = df[['Region', 'Revenue']].head(2)";
    let response = run_json(&fixture_path("sales.csv"), code);
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["columns"], json!(["Region", "Revenue"]));
    assert_eq!(response["records"][0]["Revenue"], 361.5);
    assert_eq!(response["records"][1]["Revenue"], 160.5);
}

#[test]
fn query_treats_null_comparisons_as_false() {
    let response = run_json(&fixture_path("sales.csv"), "result = df.query(\"Sales > 100\")");
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["shape"], json!([2, 5]));
    assert_eq!(response["records"][1]["Region"], "East");
}

#[test]
fn mappings_and_printed_lines_are_returned() {
    let code = "\
print('rows', len(df))
summary = {'rows': len(df), 'regions': df['Region'].nunique()}
result = summary";
    let response = run_json(&fixture_path("sales.csv"), code);
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["kind"], "mapping");
    assert_eq!(response["entries"], json!({"rows": 8, "regions": 4}));
    assert_eq!(response["output"], json!(["rows 8"]));
    assert!(response["execution_time"].as_f64().expect("time") >= 0.0);
}

#[test]
fn runtime_errors_name_the_failing_statement() {
    let code = "total = 1\nresult = df['Nope'].sum()";
    let response = run_json(&fixture_path("sales.csv"), code);
    assert_eq!(response["success"], false);
    assert_eq!(response["error_type"], "CODE_EXECUTION_ERROR");
    assert_eq!(response["details"]["line"], 2);
    assert_eq!(response["details"]["statement"], "result = df['Nope'].sum()");
    assert!(response["message"].as_str().expect("message").contains("Nope"));
    assert!(response["suggestion"].as_str().expect("suggestion").contains("read_metadata"));
}

#[test]
fn syntax_errors_report_their_position() {
    let response = run_json(&fixture_path("sales.csv"), "x = 1\nresult = (df['Sales'] +");
    assert_eq!(response["error_type"], "CODE_COMPILATION_ERROR");
    assert_eq!(response["details"]["line"], 2);
}

#[test]
fn missing_result_binding_is_an_execution_error() {
    let response = run_json(&fixture_path("sales.csv"), "answer = df['Sales'].sum()");
    assert_eq!(response["error_type"], "CODE_EXECUTION_ERROR");
    assert!(response["message"].as_str().expect("message").contains("result"));
}

#[test]
fn groupby_objects_cannot_be_returned() {
    let response = run_json(&fixture_path("sales.csv"), "result = df.groupby('Region')");
    assert_eq!(response["error_type"], "FORMATTING_ERROR");
}

#[test]
fn disabled_execution_is_reported_first() {
    let config = Config {
        enable_code_execution: false,
        ..Config::default()
    };
    let response = run_json_with(&config, &fixture_path("missing.csv"), "result = 1");
    assert_eq!(response["error_type"], "FEATURE_DISABLED");
}

#[test]
fn denial_happens_before_the_file_is_checked() {
    let response = run_json(
        &fixture_path("missing.csv"),
        "result = eval('1')",
    );
    assert_eq!(response["error_type"], "SECURITY_VIOLATION");
}

#[test]
fn workbook_sheets_are_selectable() {
    let response = tools::run_code(
        &Config::default(),
        &RunCodeRequest {
            file_path: fixture_path("regions.xlsx"),
            sheet: Some("Targets".to_string()),
            code: "result = df['Target'].sum()".to_string(),
        },
    );
    let json = serde_json::to_value(&response).expect("json");
    assert_eq!(json["success"], true, "{json}");
    assert_eq!(json["kind"], "scalar");
    assert_eq!(json["value"], 30);
}

#[test]
fn aggregations_over_groups_build_tables() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "sales.csv",
        "Region,Rep,Sales\nNorth,a,10\nSouth,b,5\nNorth,c,7\nEast,d,1\n",
    );
    let code = "result = df.groupby(['Region', 'Rep'])['Sales'].sum()";
    let response = run_json(&path, code);
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["kind"], "table");
    assert_eq!(response["shape"], json!([4, 3]));
    assert_eq!(response["records"][0], json!({"Region": "East", "Rep": "d", "Sales": 1}));
}

#[test]
fn output_printed_before_a_failure_is_returned() {
    let code = "print('checkpoint')\nresult = df['nope'].sum()";
    let response = run_json(&fixture_path("sales.csv"), code);
    assert_eq!(response["success"], false);
    assert_eq!(response["error_type"], "CODE_EXECUTION_ERROR");
    assert_eq!(response["output"], json!(["checkpoint"]));
}

#[test]
fn deeply_nested_code_is_rejected_at_compile_time() {
    let parens = format!("result = {}1{}", "(".repeat(500), ")".repeat(500));
    let response = run_json(&fixture_path("sales.csv"), &parens);
    assert_eq!(response["error_type"], "CODE_COMPILATION_ERROR", "{response}");
    assert_eq!(response["details"]["line"], 1);

    let negations = format!("result = {}1", "-".repeat(30_000));
    let response = run_json(&fixture_path("sales.csv"), &negations);
    assert_eq!(response["error_type"], "CODE_COMPILATION_ERROR");
}

#[test]
fn float_values_keep_full_precision() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("prices.csv", "item,price\na,123456.789\nb,9999.9999\nc,10000.0\n");

    let filtered = run_json(&path, "result = table[table['price'] == 9999.9999]");
    assert_eq!(filtered["success"], true, "{filtered}");
    assert_eq!(filtered["shape"], json!([1, 2]));
    assert_eq!(filtered["records"][0], json!({"item": "b", "price": 9999.9999}));

    let prices = run_json(&path, "result = table['price']");
    assert_eq!(prices["values"], json!([123456.789, 9999.9999, 10000.0]));

    let interpreted = tools::interpret_column(&Config::default(), &path, &["price".to_string()], None)
        .expect("interpret");
    let json = serde_json::to_value(&interpreted).expect("json");
    let column = &json["columns_interpretation"][0];
    assert_eq!(column["unique_count"], 3);
    assert_eq!(
        column["unique_values_with_counts"],
        json!([[9999.9999, 1], [10000.0, 1], [123456.789, 1]])
    );
}
