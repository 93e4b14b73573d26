//! Built-in notebook and file tools.
//!
//! All built-in tools reach into the notebook UI through the response
//! channel's run-ui-command round-trip; the core never touches notebook
//! files itself. The ask-mode default tools ask for confirmation unless
//! constructed auto-approved; the agent-mode toolset tools are all
//! auto-approved, matching their curated scope.

use crate::error::CoreResult;
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::service::Host;
use crate::tool::{BoxedTool, PreInvokeResponse, Tool, Toolset};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Front-end command ids used by the built-in tools.
pub mod ui_commands {
    pub const CREATE_NEW_NOTEBOOK: &str = "nbintel:create-new-notebook-from-py";
    pub const ADD_MARKDOWN_CELL: &str = "nbintel:add-markdown-cell-to-notebook";
    pub const ADD_CODE_CELL: &str = "nbintel:add-code-cell-to-notebook";
    pub const ADD_MARKDOWN_CELL_TO_ACTIVE: &str = "nbintel:add-markdown-cell-to-active-notebook";
    pub const ADD_CODE_CELL_TO_ACTIVE: &str = "nbintel:add-code-cell-to-active-notebook";
    pub const RENAME_NOTEBOOK: &str = "nbintel:rename-notebook";
    pub const GET_NUMBER_OF_CELLS: &str = "nbintel:get-number-of-cells";
    pub const GET_CELL_TYPE_AND_SOURCE: &str = "nbintel:get-cell-type-and-source";
    pub const GET_CELL_OUTPUT: &str = "nbintel:get-cell-output";
    pub const SET_CELL_TYPE_AND_SOURCE: &str = "nbintel:set-cell-type-and-source";
    pub const DELETE_CELL: &str = "nbintel:delete-cell-at-index";
    pub const INSERT_CELL: &str = "nbintel:insert-cell-at-index";
    pub const RUN_CELL: &str = "nbintel:run-cell-at-index";
    pub const SAVE_DOCUMENT: &str = "docmanager:save";
    pub const CREATE_NEW_FILE: &str = "nbintel:create-new-file";
    pub const GET_FILE_CONTENT: &str = "nbintel:get-current-file-content";
    pub const SET_FILE_CONTENT: &str = "nbintel:set-current-file-content";
    pub const OPEN_CONFIGURATION: &str = "nbintel:open-configuration-dialog";
}

/// Built-in toolset ids.
pub const NOTEBOOK_EDIT_TOOLSET: &str = "notebook-edit";
pub const NOTEBOOK_EXECUTE_TOOLSET: &str = "notebook-execute";
pub const PYTHON_FILE_EDIT_TOOLSET: &str = "python-file-edit";

fn confirmation(auto_approve: bool, name: &str) -> PreInvokeResponse {
    if auto_approve {
        PreInvokeResponse::message(format!("Calling tool '{}'", name))
    } else {
        PreInvokeResponse::with_confirmation(
            format!("Calling tool '{}'", name),
            "Approve",
            "Are you sure you want to call this tool?",
        )
    }
}

/// Strip the server root from a path the model echoed back absolute.
fn relativize(path: &str, server_root_dir: &str) -> String {
    match path.strip_prefix(server_root_dir) {
        Some(stripped) => stripped.trim_start_matches('/').to_string(),
        None => path.to_string(),
    }
}

// ============================================================================
// Default-participant tools (ask mode)
// ============================================================================

/// Creates a new notebook from provided code and markdown cells.
pub struct CreateNewNotebookTool {
    auto_approve: bool,
}

impl CreateNewNotebookTool {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl Tool for CreateNewNotebookTool {
    fn name(&self) -> String {
        "create_new_notebook".to_string()
    }

    fn title(&self) -> String {
        "Create new notebook with the provided code and markdown cells".to_string()
    }

    fn description(&self) -> String {
        "This tool creates a new notebook with the provided code and markdown cells".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cell_sources": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "cell_type": {"type": "string", "enum": ["code", "markdown"]},
                            "source": {"type": "string", "description": "The content of the cell"}
                        }
                    }
                }
            },
            "required": [],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(confirmation(self.auto_approve, &self.name()))
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let created = response
            .run_ui_command(ui_commands::CREATE_NEW_NOTEBOOK, json!({"code": ""}))
            .await?;
        let file_path = created["path"].as_str().unwrap_or_default().to_string();

        if let Some(cell_sources) = args["cell_sources"].as_array() {
            for cell in cell_sources {
                let source = cell["source"].as_str().unwrap_or_default();
                match cell["cell_type"].as_str() {
                    Some("markdown") => {
                        response
                            .run_ui_command(
                                ui_commands::ADD_MARKDOWN_CELL,
                                json!({"markdown": source, "path": file_path}),
                            )
                            .await?;
                    }
                    Some("code") => {
                        response
                            .run_ui_command(
                                ui_commands::ADD_CODE_CELL,
                                json!({"code": source, "path": file_path}),
                            )
                            .await?;
                    }
                    _ => {}
                }
            }
        }

        Ok(Value::String(format!(
            "Notebook created successfully at {}",
            file_path
        )))
    }
}

/// Adds a markdown cell to a notebook addressed by path.
pub struct AddMarkdownCellToNotebookTool {
    auto_approve: bool,
}

impl AddMarkdownCellToNotebookTool {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl Tool for AddMarkdownCellToNotebookTool {
    fn name(&self) -> String {
        "add_markdown_cell_to_notebook".to_string()
    }

    fn title(&self) -> String {
        "Add markdown cell to notebook".to_string()
    }

    fn description(&self) -> String {
        "This is a tool that adds markdown cell to a notebook".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "notebook_file_path": {
                    "type": "string",
                    "description": "Notebook file path to add the markdown cell to"
                },
                "markdown_cell_source": {
                    "type": "string",
                    "description": "Markdown to add to the notebook"
                }
            },
            "required": ["notebook_file_path", "markdown_cell_source"],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(confirmation(self.auto_approve, &self.name()))
    }

    async fn invoke(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let path = relativize(
            args["notebook_file_path"].as_str().unwrap_or_default(),
            request.host.config().server_root_dir(),
        );
        let source = args["markdown_cell_source"].as_str().unwrap_or_default();
        response
            .run_ui_command(
                ui_commands::ADD_MARKDOWN_CELL,
                json!({"markdown": source, "path": path}),
            )
            .await?;
        Ok(Value::String("Added markdown cell to notebook".to_string()))
    }
}

/// Adds a code cell to a notebook addressed by path.
pub struct AddCodeCellTool {
    auto_approve: bool,
}

impl AddCodeCellTool {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl Tool for AddCodeCellTool {
    fn name(&self) -> String {
        "add_code_cell_to_notebook".to_string()
    }

    fn title(&self) -> String {
        "Add code cell to notebook".to_string()
    }

    fn description(&self) -> String {
        "This is a tool that adds code cell to a notebook".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "notebook_file_path": {
                    "type": "string",
                    "description": "Notebook file path to add the code cell to"
                },
                "code_cell_source": {
                    "type": "string",
                    "description": "Code to add to the notebook"
                }
            },
            "required": ["notebook_file_path", "code_cell_source"],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(confirmation(self.auto_approve, &self.name()))
    }

    async fn invoke(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let path = relativize(
            args["notebook_file_path"].as_str().unwrap_or_default(),
            request.host.config().server_root_dir(),
        );
        let source = args["code_cell_source"].as_str().unwrap_or_default();
        response
            .run_ui_command(
                ui_commands::ADD_CODE_CELL,
                json!({"code": source, "path": path}),
            )
            .await?;
        Ok(Value::String("Added code cell to notebook".to_string()))
    }
}

/// Fallback tool for models that emit `python` tool calls. Adds the code
/// as a cell to the notebook named by the tool context.
pub struct PythonTool {
    auto_approve: bool,
}

impl PythonTool {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> String {
        "python".to_string()
    }

    fn title(&self) -> String {
        "Add code cell to notebook".to_string()
    }

    fn description(&self) -> String {
        "This is a tool that adds code cell to a notebook".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code_cell_source": {
                    "type": "string",
                    "description": "Code to add to the notebook"
                }
            },
            "required": ["code_cell_source"],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(confirmation(self.auto_approve, &self.name()))
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        response: &dyn ResponseChannel,
        tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let code = args["code_cell_source"].as_str().unwrap_or_default();
        let path = tool_context["file_path"].as_str().unwrap_or_default();
        response
            .run_ui_command(
                ui_commands::ADD_CODE_CELL,
                json!({"code": code, "path": path}),
            )
            .await?;
        Ok(json!({"result": "Code cell added to notebook"}))
    }
}

// ============================================================================
// Toolset tools (agent mode)
// ============================================================================

/// How a UI-command tool turns the command response into a tool result.
#[derive(Debug, Clone, Copy)]
enum UiToolResult {
    /// A fixed message.
    Static(&'static str),
    /// The stringified UI command response.
    Response,
    /// A message with `{path}` substituted from the response.
    PathMessage(&'static str),
}

/// A single-shot tool that maps its arguments onto one UI command.
struct UiCommandTool {
    name: &'static str,
    description: &'static str,
    parameters: Value,
    command_id: &'static str,
    /// (tool argument, UI command argument) pairs.
    arg_map: &'static [(&'static str, &'static str)],
    result: UiToolResult,
}

#[async_trait]
impl Tool for UiCommandTool {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn description(&self) -> String {
        self.description.to_string()
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(confirmation(true, self.name))
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let mut ui_args = Map::new();
        for (tool_key, ui_key) in self.arg_map {
            if let Some(value) = args.get(*tool_key) {
                ui_args.insert((*ui_key).to_string(), value.clone());
            }
        }

        let ui_response = response
            .run_ui_command(self.command_id, Value::Object(ui_args))
            .await?;

        let result = match self.result {
            UiToolResult::Static(message) => message.to_string(),
            UiToolResult::Response => ui_response.to_string(),
            UiToolResult::PathMessage(template) => {
                template.replace("{path}", ui_response["path"].as_str().unwrap_or_default())
            }
        };
        Ok(Value::String(result))
    }
}

fn string_param(name: &str, description: &str) -> (String, Value) {
    (
        name.to_string(),
        json!({"type": "string", "description": description}),
    )
}

fn integer_param(name: &str, description: &str) -> (String, Value) {
    (
        name.to_string(),
        json!({"type": "integer", "description": description}),
    )
}

fn object_schema(params: Vec<(String, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = params.into_iter().collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

const NOTEBOOK_EDIT_INSTRUCTIONS: &str = r#"
You are an assistant that creates and edits Jupyter notebooks. Notebooks are made up of source code cells and markdown cells. Markdown cells have source in markdown format and code cells have source in a specified programming language. If no programming language is specified, then use Python for the language of the code.

If you need to create a notebook use the create_new_notebook tool. If you need to add a code cell to the notebook use the add_code_cell tool. If you need to add a markdown cell to the notebook use the add_markdown_cell tool.

If you need to rename a notebook use the rename_notebook tool.

You can refer to cells in notebooks by their index. The first cell in the notebook has index 0, the second cell has index 1, and so on. You can get the number of cells in the notebook using the get_number_of_cells tool. You can get the type and source of a cell using the get_cell_type_and_source tool. You can get the output of a cell using the get_cell_output tool.

If you need to make changes to an existing notebook use the tools to get existing cell type and source. Use the set_cell_type_and_source tool for updating cell type and source.

If you need to install any packages you should use %pip install <package_name> in a code cell instead of !pip install <package_name>.

If you need to detect issues in a notebook check the code cell sources and also the cell output for any problems.

After you are done making changes to the notebook, save the notebook using the save_notebook tool.

First create an execution plan and show before calling any tools. The execution plan should be a list of steps that you will take. Then call the tools to execute the plan.
"#;

const NOTEBOOK_EXECUTE_INSTRUCTIONS: &str = r#"
Running a notebook and executing a notebook refer to the same thing. Running a notebook means executing all the cells in the notebook in order. If you need to run a cell in the notebook use the run_cell tool with the cell index. Executing a cell and running a cell are the same thing.

If you create a new notebook and run it, then check for errors in the output of the cells. If there are any errors in the output, update the cell code that caused the error to fix it and rerun the cell. Repeat until there are no errors in the output of the cells.

After you are done running the notebook, save the notebook using the save_notebook tool.
"#;

const PYTHON_FILE_EDIT_INSTRUCTIONS: &str = r#"
If you need to create a new Python file use the create_new_python_file tool. If you need to edit an existing Python file use the get_file_content tool to get the content of the file and then use the set_file_content tool to set the content of the file.
"#;

fn notebook_edit_tools() -> Vec<BoxedTool> {
    vec![
        Arc::new(CreateNewNotebookTool::new(true)),
        Arc::new(UiCommandTool {
            name: "rename_notebook",
            description: "Renames the notebook",
            parameters: object_schema(
                vec![string_param("new_name", "New name for the notebook")],
                &["new_name"],
            ),
            command_id: ui_commands::RENAME_NOTEBOOK,
            arg_map: &[("new_name", "newName")],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "add_markdown_cell",
            description: "Adds a markdown cell to the active notebook",
            parameters: object_schema(
                vec![string_param("source", "Markdown source")],
                &["source"],
            ),
            command_id: ui_commands::ADD_MARKDOWN_CELL_TO_ACTIVE,
            arg_map: &[("source", "source")],
            result: UiToolResult::Static("Added markdown cell to notebook"),
        }),
        Arc::new(UiCommandTool {
            name: "add_code_cell",
            description: "Adds a code cell to the active notebook",
            parameters: object_schema(
                vec![string_param("source", "Python code source")],
                &["source"],
            ),
            command_id: ui_commands::ADD_CODE_CELL_TO_ACTIVE,
            arg_map: &[("source", "source")],
            result: UiToolResult::Static("Added code cell to notebook"),
        }),
        Arc::new(UiCommandTool {
            name: "get_number_of_cells",
            description: "Get number of cells for the active notebook",
            parameters: object_schema(vec![], &[]),
            command_id: ui_commands::GET_NUMBER_OF_CELLS,
            arg_map: &[],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "get_cell_type_and_source",
            description: "Get cell type and source for the cell at index for the active notebook",
            parameters: object_schema(
                vec![integer_param("cell_index", "Zero based cell index")],
                &["cell_index"],
            ),
            command_id: ui_commands::GET_CELL_TYPE_AND_SOURCE,
            arg_map: &[("cell_index", "cellIndex")],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "get_cell_output",
            description: "Get cell output for the cell at index for the active notebook",
            parameters: object_schema(
                vec![integer_param("cell_index", "Zero based cell index")],
                &["cell_index"],
            ),
            command_id: ui_commands::GET_CELL_OUTPUT,
            arg_map: &[("cell_index", "cellIndex")],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "set_cell_type_and_source",
            description: "Set cell type and source for the cell at index for the active notebook",
            parameters: object_schema(
                vec![
                    integer_param("cell_index", "Zero based cell index"),
                    string_param("cell_type", "Cell type (code or markdown)"),
                    string_param("source", "Markdown or Python code source"),
                ],
                &["cell_index", "cell_type", "source"],
            ),
            command_id: ui_commands::SET_CELL_TYPE_AND_SOURCE,
            arg_map: &[
                ("cell_index", "cellIndex"),
                ("cell_type", "cellType"),
                ("source", "source"),
            ],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "delete_cell",
            description: "Delete the cell at index for the active notebook",
            parameters: object_schema(
                vec![integer_param("cell_index", "Zero based cell index")],
                &["cell_index"],
            ),
            command_id: ui_commands::DELETE_CELL,
            arg_map: &[("cell_index", "cellIndex")],
            result: UiToolResult::Static("Deleted the cell"),
        }),
        Arc::new(UiCommandTool {
            name: "insert_cell",
            description: "Insert cell with type and source at index for the active notebook",
            parameters: object_schema(
                vec![
                    integer_param("cell_index", "Zero based cell index"),
                    string_param("cell_type", "Cell type (code or markdown)"),
                    string_param("source", "Markdown or Python code source"),
                ],
                &["cell_index", "cell_type", "source"],
            ),
            command_id: ui_commands::INSERT_CELL,
            arg_map: &[
                ("cell_index", "cellIndex"),
                ("cell_type", "cellType"),
                ("source", "source"),
            ],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "save_notebook",
            description: "Save the changes in active notebook to disk",
            parameters: object_schema(vec![], &[]),
            command_id: ui_commands::SAVE_DOCUMENT,
            arg_map: &[],
            result: UiToolResult::Static("Saved the notebook"),
        }),
    ]
}

fn notebook_execute_tools() -> Vec<BoxedTool> {
    vec![Arc::new(UiCommandTool {
        name: "run_cell",
        description: "Run the cell at index for the active notebook",
        parameters: object_schema(
            vec![integer_param("cell_index", "Zero based cell index")],
            &["cell_index"],
        ),
        command_id: ui_commands::RUN_CELL,
        arg_map: &[("cell_index", "cellIndex")],
        result: UiToolResult::Static("Ran the cell"),
    })]
}

fn python_file_edit_tools() -> Vec<BoxedTool> {
    vec![
        Arc::new(UiCommandTool {
            name: "create_new_python_file",
            description: "Creates a new Python file",
            parameters: object_schema(vec![string_param("code", "Python code source")], &["code"]),
            command_id: ui_commands::CREATE_NEW_FILE,
            arg_map: &[("code", "code")],
            result: UiToolResult::PathMessage("Created new Python file at {path}"),
        }),
        Arc::new(UiCommandTool {
            name: "get_file_content",
            description: "Returns the content of the current file",
            parameters: object_schema(vec![], &[]),
            command_id: ui_commands::GET_FILE_CONTENT,
            arg_map: &[],
            result: UiToolResult::Response,
        }),
        Arc::new(UiCommandTool {
            name: "set_file_content",
            description: "Sets the content of the current file",
            parameters: object_schema(vec![string_param("content", "File content")], &["content"]),
            command_id: ui_commands::SET_FILE_CONTENT,
            arg_map: &[("content", "content")],
            result: UiToolResult::Static("Set the file content"),
        }),
    ]
}

/// The built-in toolsets offered in agent mode.
pub fn built_in_toolsets() -> Vec<Toolset> {
    vec![
        Toolset::new(
            NOTEBOOK_EDIT_TOOLSET,
            "Notebook edit",
            "Notebook edit",
            notebook_edit_tools(),
            Some(NOTEBOOK_EDIT_INSTRUCTIONS.to_string()),
        ),
        Toolset::new(
            NOTEBOOK_EXECUTE_TOOLSET,
            "Notebook execute",
            "Notebook execute",
            notebook_execute_tools(),
            Some(NOTEBOOK_EXECUTE_INSTRUCTIONS.to_string()),
        ),
        Toolset::new(
            PYTHON_FILE_EDIT_TOOLSET,
            "Python file edit",
            "Python file edit",
            python_file_edit_tools(),
            Some(PYTHON_FILE_EDIT_INSTRUCTIONS.to_string()),
        ),
    ]
}

/// Resolve a default-participant tool by name, used when MCP
/// participants are configured with built-in notebook tools.
pub fn tool_by_name(name: &str) -> Option<BoxedTool> {
    match name {
        "create_new_notebook" => Some(Arc::new(CreateNewNotebookTool::new(false))),
        "add_markdown_cell_to_notebook" => Some(Arc::new(AddMarkdownCellToNotebookTool::new(false))),
        "add_code_cell_to_notebook" => Some(Arc::new(AddCodeCellTool::new(false))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingChannel, TestHost};

    #[test]
    fn test_toolset_contents() {
        let toolsets = built_in_toolsets();
        assert_eq!(toolsets.len(), 3);

        let edit = &toolsets[0];
        assert_eq!(edit.id, NOTEBOOK_EDIT_TOOLSET);
        assert!(edit.tool("create_new_notebook").is_some());
        assert!(edit.tool("save_notebook").is_some());
        assert!(edit.tool("run_cell").is_none());
        assert!(edit.instructions.is_some());

        let execute = &toolsets[1];
        assert!(execute.tool("run_cell").is_some());

        let file_edit = &toolsets[2];
        assert!(file_edit.tool("create_new_python_file").is_some());
    }

    #[test]
    fn test_tool_by_name() {
        assert!(tool_by_name("create_new_notebook").is_some());
        assert!(tool_by_name("add_code_cell_to_notebook").is_some());
        assert!(tool_by_name("unknown").is_none());
    }

    #[test]
    fn test_relativize() {
        assert_eq!(relativize("/work/nb.ipynb", "/work"), "nb.ipynb");
        assert_eq!(relativize("nb.ipynb", "/work"), "nb.ipynb");
        assert_eq!(relativize("/other/nb.ipynb", "/work"), "/other/nb.ipynb");
    }

    #[tokio::test]
    async fn test_create_new_notebook_adds_cells() {
        let host = TestHost::without_model();
        let request = host.request("make a notebook");
        let channel = RecordingChannel::new("msg-1");
        channel.set_ui_command_result(json!({"path": "analysis.ipynb"}));

        let tool = CreateNewNotebookTool::new(true);
        let result = tool
            .invoke(
                &request,
                &channel,
                &json!({}),
                json!({"cell_sources": [
                    {"cell_type": "markdown", "source": "# Title"},
                    {"cell_type": "code", "source": "x = 1"},
                ]}),
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            json!("Notebook created successfully at analysis.ipynb")
        );
        let commands = channel.ui_command_log();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].0, ui_commands::CREATE_NEW_NOTEBOOK);
        assert_eq!(commands[1].0, ui_commands::ADD_MARKDOWN_CELL);
        assert_eq!(commands[2].0, ui_commands::ADD_CODE_CELL);
        assert_eq!(commands[2].1["path"], "analysis.ipynb");
    }

    #[tokio::test]
    async fn test_add_code_cell_relativizes_path() {
        let host = TestHost::without_model();
        let request = host.request("add a cell");
        let channel = RecordingChannel::new("msg-1");

        let tool = AddCodeCellTool::new(true);
        tool.invoke(
            &request,
            &channel,
            &json!({}),
            json!({
                "notebook_file_path": format!("{}/nb.ipynb", host.server_root_dir()),
                "code_cell_source": "y = 2",
            }),
        )
        .await
        .unwrap();

        let commands = channel.ui_command_log();
        assert_eq!(commands[0].1["path"], "nb.ipynb");
        assert_eq!(commands[0].1["code"], "y = 2");
    }

    #[tokio::test]
    async fn test_python_tool_uses_context_path() {
        let host = TestHost::without_model();
        let request = host.request("run python");
        let channel = RecordingChannel::new("msg-1");

        let tool = PythonTool::new(true);
        let result = tool
            .invoke(
                &request,
                &channel,
                &json!({"file_path": "current.ipynb"}),
                json!({"code_cell_source": "print(1)"}),
            )
            .await
            .unwrap();

        assert_eq!(result["result"], "Code cell added to notebook");
        let commands = channel.ui_command_log();
        assert_eq!(commands[0].1["path"], "current.ipynb");
    }

    #[test]
    fn test_confirmation_gate() {
        let guarded = CreateNewNotebookTool::new(false);
        let host = TestHost::without_model();
        let request = host.request("x");
        let pre = guarded.pre_invoke(&request, &json!({})).unwrap();
        assert!(pre.confirmation_message.is_some());

        let auto = CreateNewNotebookTool::new(true);
        let pre = auto.pre_invoke(&request, &json!({})).unwrap();
        assert!(pre.confirmation_message.is_none());
        assert!(pre.message.unwrap().contains("create_new_notebook"));
    }
}
