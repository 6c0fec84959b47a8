//! 类型擦除的调用载荷
//!
//! 同一个拦截器实例要处理服务上的所有方法，请求/响应的具体类型只有
//! handler 自己知道。`Message` 以引用计数共享，克隆代价很低，
//! 因此 handler 消费请求之后装饰器仍然能看到同一个值

use std::any::Any;
use std::fmt;
use std::sync::Arc;

trait ErasedMessage: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + fmt::Debug + Send + Sync> ErasedMessage for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// gRPC 请求或响应消息
#[derive(Clone)]
pub struct Message(Arc<dyn ErasedMessage>);

impl Message {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + Send + Sync,
    {
        Self(Arc::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.0).as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// 取出具体类型的值
    ///
    /// 仅在没有其它持有者时移出，否则克隆一份
    pub fn into_inner<T>(self) -> Option<T>
    where
        T: Any + Clone + Send + Sync,
    {
        let value = self.0.into_any_arc().downcast::<T>().ok()?;
        Some(Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
