#![deny(unsafe_code)]
#![doc = "spark-rpc-gateway: 将完成队列驱动的异步 RPC 客户端桥接为回调式请求处理器。"]
#![doc = ""]
#![doc = "== 运行模型 =="]
#![doc = "每个 [`Gateway`] 独占一个完成队列与一条调度线程。提交操作时登记一次性续延并换取不透明 [`Tag`]，"]
#![doc = "调度线程弹出 `(tag, ok)` 后把续延交给调用方提供的 [`ResultExecutor`]，续延最终在调用方的 [`EventLoop`] 上执行。"]
#![doc = ""]
#![doc = "== 交付保证 =="]
#![doc = "1. 每个结果处理器恰好被调用一次，且从不在 `handle_request` 的调用栈内同步触发；"]
#![doc = "2. 网关销毁后的提交不会触达传输层，异步交付 `gateway.queue_closed`；"]
#![doc = "3. 销毁时仍在途的操作同样以失败形式交付，不会悬挂。"]

pub mod config;
pub mod contract;
mod dispatcher;
pub mod error;
pub mod event_loop;
mod gateway;
pub mod handler;
pub mod status;
mod stream;
pub mod tag;
pub mod test_stubs;
pub mod transport;
mod unary;

pub use config::GatewayConfig;
pub use contract::{Cancellation, Deadline, RpcContext};
pub use error::{BuildError, ErrorKind, GatewayError, is_end_of_stream};
pub use event_loop::{EventLoop, QueuedEventLoop, ResultExecutor, Task};
pub use gateway::{Gateway, make_gateway, make_gateway_with_config, make_read_stream_factory};
pub use handler::{HandlerResult, RequestHandler, ResultHandler, SharedRequestHandler};
pub use status::{Status, StatusCode, error_from_status, error_kind_for};
pub use tag::Tag;
pub use transport::{
    Channel, CompletionQueue, CompletionSlot, QueueEvent, StreamMethod, StreamReader, UnaryCall,
    UnaryMethod,
};
