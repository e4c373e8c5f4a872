// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Web 框架启动器
//!
//! 该模块是框架的装配层：加载配置与日志、构建 Tokio 运行时、在服务器启动前
//! 完成显式的注册流程（路由与过滤器），然后进入主接收循环。
//!
//! 核心库只消费这里产出的注册清单；演示用的内存用户存储属于业务协作方，
//! 与框架核心解耦，仅存在于本二进制中。
//! - 路由系统（支持路径变量、方法分组与先注册者胜出的决胜规则）
//! - 过滤器管线（演示用日志过滤器）
//! - 后台管理控制台（CLI 指令交互）

use webframework::config::Config;
use webframework::exception::Exception;
use webframework::filter::LoggingFilter;
use webframework::request::Request;
use webframework::router::Handler;
use webframework::server::WebServer;

use log::info;
use log4rs;
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Builder;
use tokio::sync::watch;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// # 程序入口点
///
/// 初始化系统环境、加载配置、完成注册流程并启动主接收循环。
fn main() {
    // 1. 初始化日志系统：采用 log4rs 异步日志架构，通过外部 YAML 灵活配置级别与输出目的地
    log4rs::init_file("config/log4rs.yaml", Default::default()).unwrap();

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!(
        "端口: {}，工作线程数: {}",
        config.port(),
        config.worker_threads()
    );

    // 3. 运行时定制：工作线程数即 worker 池大小，每个连接由一个任务从头到尾处理
    let worker_threads = config.worker_threads();
    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .unwrap();

    // 4. 注册流程（外部装配层）：路由与过滤器必须在接收循环启动前全部就位
    let mut server = WebServer::from_config(config);
    server.add_filter(Box::new(LoggingFilter));

    let store = Arc::new(Mutex::new(UserStore::with_sample_data()));
    register_routes(&mut server, store);

    let route_listing = server.registered_routes();
    for route in &route_listing {
        info!("已注册路由: {}", route);
    }

    // 5. 服务器生命周期管理
    // shutdown: 用于优雅停机 (Graceful Shutdown)
    // active_connection: 追踪当前并发连接数
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let active_connection = Arc::new(Mutex::new(0u32));

    // 6. 启动交互式管理控制台任务与主接收循环
    runtime.block_on(async move {
        tokio::spawn(console_task(
            shutdown_tx,
            Arc::clone(&active_connection),
            route_listing,
        ));
        server.run(shutdown_rx, active_connection).await;
    });
}

/// # 管理控制台
///
/// 运行在后台，不阻塞接收循环，提供运维指令支持。
async fn console_task(
    shutdown: watch::Sender<bool>,
    active_connection: Arc<Mutex<u32>>,
    routes: Vec<String>,
) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                let _ = shutdown.send(true);
                println!("停机指令已激活，服务器将在处理完在途请求后关闭...");
                break;
            }
            "status" => {
                let active_count = *active_connection.lock().unwrap();
                println!("== Webframework 状态 ==");
                println!("当前活跃连接数: {}", active_count);
                println!("======================");
            }
            "routes" => {
                println!("== 已注册路由 ==");
                for route in &routes {
                    println!("  {}", route);
                }
                println!("================");
            }
            "help" => {
                println!("== Webframework Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("routes - 列出已注册路由");
                println!("help   - 显示此帮助信息");
                println!("=======================");
            }
            "" => {}
            cmd => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}

// --- 演示用业务协作方：内存用户存储与用户 API ---

/// 演示用的用户实体
#[derive(Serialize, Deserialize, Debug, Clone)]
struct User {
    id: u64,
    name: String,
    email: String,
}

/// 创建/更新用户的请求负载，字段均可缺省，由各端点自行校验
#[derive(Deserialize)]
struct UserPayload {
    name: Option<String>,
    email: Option<String>,
}

/// 内存用户存储。由各处理器通过 `Arc<Mutex<...>>` 共享。
struct UserStore {
    users: HashMap<u64, User>,
    next_id: u64,
}

impl UserStore {
    fn with_sample_data() -> Self {
        let mut store = Self {
            users: HashMap::new(),
            next_id: 1,
        };
        store.create("John Doe", "john@example.com");
        store.create("Jane Smith", "jane@example.com");
        store.create("Bob Johnson", "bob@example.com");
        info!("用户存储初始化完成，共{}个示例用户", store.users.len());
        store
    }

    fn all(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|user| user.id);
        users
    }

    fn get(&self, id: u64) -> Result<User, Exception> {
        match self.users.get(&id) {
            Some(user) => Ok(user.clone()),
            None => Err(Exception::NotFound(format!(
                "User not found with id: {}",
                id
            ))),
        }
    }

    fn create(&mut self, name: &str, email: &str) -> User {
        let user = User {
            id: self.next_id,
            name: name.to_string(),
            email: email.to_string(),
        };
        self.next_id += 1;
        self.users.insert(user.id, user.clone());
        user
    }

    fn update(
        &mut self,
        id: u64,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, Exception> {
        let user = match self.users.get_mut(&id) {
            Some(user) => user,
            None => {
                return Err(Exception::NotFound(format!(
                    "User not found with id: {}",
                    id
                )))
            }
        };
        if let Some(name) = name {
            user.name = name.to_string();
        }
        if let Some(email) = email {
            user.email = email.to_string();
        }
        Ok(user.clone())
    }

    fn delete(&mut self, id: u64) -> Result<(), Exception> {
        match self.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(Exception::NotFound(format!(
                "User not found with id: {}",
                id
            ))),
        }
    }
}

/// 从路径变量中取出并解析用户 ID；非数字按校验错误处理
fn parse_user_id(request: &Request) -> Result<u64, Exception> {
    let raw = request.path_variable("id").unwrap_or("");
    raw.parse().map_err(|_| Exception::Validation {
        field: "id".to_string(),
        message: "User ID must be a valid number".to_string(),
    })
}

/// 显式注册流程：把用户 API 的各端点与处理器形态登记到路由表。
fn register_routes(server: &mut WebServer, store: Arc<Mutex<UserStore>>) {
    // GET / —— 仅响应形态的处理器
    server.register_route(
        "GET",
        "/",
        Handler::response_only(|response| {
            response.html(
                r"<!DOCTYPE html>
<html>
<head><meta charset='utf-8'><title>shaneyale-webframework</title></head>
<body>
<h1>shaneyale-webframework</h1>
<p>服务已启动。用户 API 挂载在 <code>/api/users</code> 下。</p>
</body>
</html>",
            )
        }),
    );

    // GET /health —— 无参形态的处理器，返回的字符串按原始JSON响应体发送
    server.register_route(
        "GET",
        "/health",
        Handler::niladic(|| {
            Ok(json!({
                "status": "UP",
                "version": env!("CARGO_PKG_VERSION"),
            })
            .to_string())
        }),
    );

    // GET /api/users —— 支持limit查询参数
    let list_store = Arc::clone(&store);
    server.register_route(
        "GET",
        "/api/users",
        Handler::full(move |request, response| {
            let mut users = list_store.lock().unwrap().all();
            if let Some(limit) = request.query_param("limit") {
                let limit: usize = limit.parse().map_err(|_| {
                    Exception::BadArgument("limit must be a valid number".to_string())
                })?;
                users.truncate(limit);
            }
            let body = json!({
                "success": true,
                "count": users.len(),
                "data": users,
            });
            response.json(&body.to_string())
        }),
    );

    // GET /api/users/{id}
    let get_store = Arc::clone(&store);
    server.register_route(
        "GET",
        "/api/users/{id}",
        Handler::full(move |request, response| {
            let id = parse_user_id(request)?;
            let user = get_store.lock().unwrap().get(id)?;
            let body = json!({
                "success": true,
                "data": user,
            });
            response.json(&body.to_string())
        }),
    );

    // POST /api/users —— 校验必填字段后创建
    let create_store = Arc::clone(&store);
    server.register_route(
        "POST",
        "/api/users",
        Handler::full(move |request, response| {
            let body = request.body();
            if body.is_empty() {
                return Err(Exception::Validation {
                    field: "body".to_string(),
                    message: "Request body is required".to_string(),
                });
            }
            let payload: UserPayload = serde_json::from_str(body)
                .map_err(|_| Exception::BadArgument("Invalid request body".to_string()))?;

            let name = match payload.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    return Err(Exception::Validation {
                        field: "name".to_string(),
                        message: "Name is required".to_string(),
                    })
                }
            };
            let email = match payload.email.as_deref().map(str::trim) {
                Some(email) if email.contains('@') => email.to_string(),
                _ => {
                    return Err(Exception::Validation {
                        field: "email".to_string(),
                        message: "Valid email is required".to_string(),
                    })
                }
            };

            let user = create_store.lock().unwrap().create(&name, &email);
            let body = json!({
                "success": true,
                "message": "User created successfully",
                "data": user,
            });
            response.set_status(201).json(&body.to_string())
        }),
    );

    // PUT /api/users/{id} —— 部分字段更新
    let update_store = Arc::clone(&store);
    server.register_route(
        "PUT",
        "/api/users/{id}",
        Handler::full(move |request, response| {
            let id = parse_user_id(request)?;
            let payload: UserPayload = serde_json::from_str(request.body())
                .map_err(|_| Exception::BadArgument("Invalid request body".to_string()))?;

            if let Some(email) = payload.email.as_deref() {
                if !email.contains('@') {
                    return Err(Exception::Validation {
                        field: "email".to_string(),
                        message: "Valid email is required".to_string(),
                    });
                }
            }

            let user = update_store.lock().unwrap().update(
                id,
                payload.name.as_deref(),
                payload.email.as_deref(),
            )?;
            let body = json!({
                "success": true,
                "message": "User updated successfully",
                "data": user,
            });
            response.json(&body.to_string())
        }),
    );

    // DELETE /api/users/{id}
    let delete_store = Arc::clone(&store);
    server.register_route(
        "DELETE",
        "/api/users/{id}",
        Handler::full(move |request, response| {
            let id = parse_user_id(request)?;
            delete_store.lock().unwrap().delete(id)?;
            let body = json!({
                "success": true,
                "message": "User deleted successfully",
            });
            response.json(&body.to_string())
        }),
    );
}
